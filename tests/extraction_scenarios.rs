use sheaf::dataset::Example;
use sheaf::encoder::hashing::HashingEncoder;
use sheaf::error::Result;
use sheaf::features::extractor::shard_indices;
use sheaf::features::{
    BatchProducer, EncoderBatchProducer, ExtractorConfig, ShardPolicy, ShardedExtractor,
};
use sheaf::tokenizer::{HashingTokenizer, TokenizeOptions};

fn options() -> TokenizeOptions {
    TokenizeOptions {
        max_length: 6,
        ..Default::default()
    }
}

fn examples(n: usize) -> Vec<Example> {
    (0..n)
        .map(|i| Example::new(format!("note {i} mentions symptom {}", i % 7), i % 5))
        .collect()
}

fn extractor(shards: usize, policy: ShardPolicy) -> ShardedExtractor {
    ShardedExtractor::new(ExtractorConfig {
        shards,
        policy,
        parallel: false,
    })
    .unwrap()
}

#[test]
fn test_four_example_scenario() -> Result<()> {
    let tokenizer = HashingTokenizer::default();
    let encoder = HashingEncoder::new("hashing", 3, 1)?;
    let producer = EncoderBatchProducer::new(&tokenizer, &encoder, options(), 32)?;

    let split = vec![
        Example::new("a", 0),
        Example::new("b", 1),
        Example::new("c", 0),
        Example::new("d", 1),
    ];
    assert_eq!(
        shard_indices(split.len(), 2, ShardPolicy::Contiguous),
        vec![vec![0, 1], vec![2, 3]]
    );

    let (matrix, labels) = extractor(2, ShardPolicy::Contiguous).extract(&split, &producer)?;
    assert_eq!(&labels[..], &[0, 1, 0, 1]);

    // each row must be exactly what the producer computes for that example alone
    for (i, example) in split.iter().enumerate() {
        let expected = producer.produce(&[example])?;
        assert_eq!(matrix.row(i), expected[0].as_slice());
    }
    Ok(())
}

#[test]
fn test_shard_count_does_not_change_features() -> Result<()> {
    let tokenizer = HashingTokenizer::default();
    let encoder = HashingEncoder::new("hashing", 4, 9)?;
    let producer = EncoderBatchProducer::new(&tokenizer, &encoder, options(), 4)?;
    let split = examples(37);

    let (single, single_labels) =
        extractor(1, ShardPolicy::Contiguous).extract(&split, &producer)?;
    let (ten, ten_labels) = extractor(10, ShardPolicy::Contiguous).extract(&split, &producer)?;

    assert_eq!(single, ten);
    assert_eq!(single_labels, ten_labels);
    assert_eq!(single.shape(), (37, 6 * 4));
    Ok(())
}

#[test]
fn test_row_count_and_pairing_for_many_sizes() -> Result<()> {
    let tokenizer = HashingTokenizer::default();
    let encoder = HashingEncoder::new("hashing", 2, 0)?;
    let producer = EncoderBatchProducer::new(&tokenizer, &encoder, options(), 3)?;

    for n in [0, 1, 5, 9, 10, 11, 23] {
        let split = examples(n);
        for policy in [ShardPolicy::Contiguous, ShardPolicy::Strided] {
            let (matrix, labels) = extractor(10, policy).extract(&split, &producer)?;
            assert_eq!(matrix.rows(), n);
            assert_eq!(labels.len(), n);

            let order: Vec<usize> = shard_indices(n, 10, policy).into_iter().flatten().collect();
            for (row, &index) in order.iter().enumerate() {
                assert_eq!(labels[row], split[index].label);
                assert_eq!(
                    matrix.row(row),
                    producer.produce(&[&split[index]])?[0].as_slice()
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_extraction_is_deterministic() -> Result<()> {
    let tokenizer = HashingTokenizer::default();
    let encoder = HashingEncoder::new("hashing", 4, 3)?;
    let producer = EncoderBatchProducer::new(&tokenizer, &encoder, options(), 8)?;
    let split = examples(25);

    let first = extractor(10, ShardPolicy::Strided).extract(&split, &producer)?;
    let second = extractor(10, ShardPolicy::Strided).extract(&split, &producer)?;
    assert_eq!(first, second);

    let parallel = ShardedExtractor::new(ExtractorConfig {
        shards: 10,
        policy: ShardPolicy::Strided,
        parallel: true,
    })?
    .extract(&split, &producer)?;
    assert_eq!(first, parallel);
    Ok(())
}
