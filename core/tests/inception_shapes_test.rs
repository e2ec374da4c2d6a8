use inception_rs::backend::{MetaBackend, MetaTensor};
use inception_rs::error::InceptionError;
use inception_rs::graph::{GraphBuilder, Mode};
use inception_rs::models::inception::{InceptionConfig, InceptionV3, build_classifier};
use inception_rs::models::Classifier;
use inception_rs::params::ParamStore;
use inception_rs::shape::Layout;

fn param_shape(store: &ParamStore<MetaBackend>, name: &str) -> Vec<usize> {
    store
        .get(name)
        .unwrap_or_else(|| panic!("missing parameter {name}"))
        .shape()
        .to_vec()
}

#[test]
fn test_reference_network_299() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let logits = build_classifier(&mut g, &MetaTensor::new([1, 3, 299, 299]), Layout::ChannelFirst).unwrap();
    assert_eq!(logits.shape(), &[1, 1000]);

    // 94 convolutions with weight and bias, plus fc1
    assert_eq!(store.len(), 190);
    assert_eq!(store.num_elements(), 23_817_352);

    assert_eq!(backend.count("conv2d"), 94);
    assert_eq!(backend.count("bias_add"), 94);
    assert_eq!(backend.count("relu"), 94);
    assert_eq!(backend.count("batch_norm"), 0);
    // 11 blocks plus the two inner splits of each E block
    assert_eq!(backend.count("concat"), 15);
    assert_eq!(backend.count("avg_pool2d"), 9);
    assert_eq!(backend.count("max_pool2d"), 5);
    assert_eq!(backend.count("dense"), 1);
    assert_eq!(backend.count("permute"), 0);
}

#[test]
fn test_block_outputs_299() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
    build_classifier(&mut g, &MetaTensor::new([2, 3, 299, 299]), Layout::ChannelFirst).unwrap();

    // Block-level concats are the 4-way ones plus the three-way B and D merges. Inner E
    // splits produce 768 channels on the 8x8 grid.
    let merges: Vec<Vec<usize>> = backend
        .trace()
        .into_iter()
        .filter(|r| r.op == "concat" && r.output != vec![2, 768, 8, 8])
        .map(|r| r.output)
        .collect();
    assert_eq!(
        merges,
        vec![
            vec![2, 256, 35, 35],
            vec![2, 288, 35, 35],
            vec![2, 288, 35, 35],
            vec![2, 768, 17, 17],
            vec![2, 768, 17, 17],
            vec![2, 768, 17, 17],
            vec![2, 768, 17, 17],
            vec![2, 768, 17, 17],
            vec![2, 1280, 8, 8],
            vec![2, 2048, 8, 8],
            vec![2, 2048, 8, 8],
        ]
    );

    // stem output feeds mixed_0
    let stem_pool = backend
        .trace()
        .into_iter()
        .filter(|r| r.op == "max_pool2d")
        .nth(1)
        .unwrap();
    assert_eq!(stem_pool.output, vec![2, 192, 35, 35]);
}

#[test]
fn test_parameter_names_and_shapes() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);
    build_classifier(&mut g, &MetaTensor::new([1, 3, 299, 299]), Layout::ChannelFirst).unwrap();

    assert_eq!(store.iter().next().unwrap().name(), "InceptionV3/conv0-weight");
    assert_eq!(store.iter().last().unwrap().name(), "InceptionV3/fc1-bias");

    assert_eq!(param_shape(&store, "InceptionV3/conv0-weight"), vec![32, 3, 3, 3]);
    assert_eq!(param_shape(&store, "InceptionV3/conv4-weight"), vec![192, 80, 3, 3]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_0/branch_pool/conv-weight"), vec![32, 192, 1, 1]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_1/branch_pool/conv-weight"), vec![64, 256, 1, 1]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_3/branch3x3/conv0-weight"), vec![384, 288, 3, 3]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_4/branch7x7/conv1-weight"), vec![128, 128, 1, 7]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_7/branch7x7dbl/conv4-weight"), vec![192, 192, 1, 7]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_8/branch7x7x3/conv3-weight"), vec![192, 192, 3, 3]);
    assert_eq!(param_shape(&store, "InceptionV3/mixed_10/branch3x3dbl/conv3-weight"), vec![384, 384, 3, 1]);
    assert_eq!(param_shape(&store, "InceptionV3/fc1-weight"), vec![1000, 2048]);
    assert_eq!(param_shape(&store, "InceptionV3/fc1-bias"), vec![1000]);
}

#[test]
fn test_channel_last_input() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let logits = build_classifier(&mut g, &MetaTensor::new([4, 299, 299, 3]), Layout::ChannelLast).unwrap();
    assert_eq!(logits.shape(), &[4, 1000]);
    assert_eq!(backend.count("permute"), 1);
    assert_eq!(backend.trace()[0].op, "permute");
    assert_eq!(backend.trace()[0].output, vec![4, 3, 299, 299]);
}

#[test]
fn test_batch_norm_variant() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let model = InceptionV3::new(InceptionConfig {
        batch_norm: true,
        ..InceptionConfig::v3()
    });
    model
        .build(&mut g, &MetaTensor::new([1, 3, 299, 299]), Layout::ChannelFirst)
        .unwrap();

    assert_eq!(backend.count("batch_norm"), 94);
    assert_eq!(store.len(), 94 * 6 + 2);
    assert_eq!(store.num_trainable_elements(), 23_851_784);
    assert_eq!(store.num_elements(), 23_886_216);
    assert!(store.contains("InceptionV3/mixed_9/branch3x3/conv1_bn-moving_variance"));
}

#[test]
fn test_training_mode_updates_statistics() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Training);

    let model = InceptionV3::new(InceptionConfig {
        batch_norm: true,
        dropout_rate: 0.2,
        ..InceptionConfig::v3()
    });
    model
        .build(&mut g, &MetaTensor::new([2, 3, 299, 299]), Layout::ChannelFirst)
        .unwrap();

    assert_eq!(backend.count("moments"), 94);
    assert_eq!(backend.count("moving_average"), 188);
    assert_eq!(backend.count("dropout"), 1);
}

#[test]
fn test_num_classes() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let model = InceptionV3::new(InceptionConfig {
        num_classes: 10,
        ..InceptionConfig::v3()
    });
    assert_eq!(model.num_classes(), 10);
    let logits = model
        .build(&mut g, &MetaTensor::new([3, 3, 299, 299]), Layout::ChannelFirst)
        .unwrap();
    assert_eq!(logits.shape(), &[3, 10]);
    assert_eq!(param_shape(&store, "InceptionV3/fc1-weight"), vec![10, 2048]);
}

#[test]
fn test_rebuild_reuses_parameters() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    build_classifier(&mut g, &MetaTensor::new([1, 3, 299, 299]), Layout::ChannelFirst).unwrap();
    build_classifier(&mut g, &MetaTensor::new([8, 3, 299, 299]), Layout::ChannelFirst).unwrap();

    assert_eq!(backend.count("materialize"), 190);
    assert_eq!(backend.count("conv2d"), 188);
    assert_eq!(store.len(), 190);
}

#[test]
fn test_larger_input_grows_classifier() {
    // 363x363 ends on a 10x10 grid, so the 8x8 pool leaves 3x3 and fc1 sees 2048 * 9 features.
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let logits = build_classifier(&mut g, &MetaTensor::new([1, 3, 363, 363]), Layout::ChannelFirst).unwrap();
    assert_eq!(logits.shape(), &[1, 1000]);
    assert_eq!(param_shape(&store, "InceptionV3/fc1-weight"), vec![1000, 2048 * 9]);
}

#[test]
fn test_input_too_small() {
    let backend = MetaBackend::new();
    let mut store = ParamStore::new();
    let mut g = GraphBuilder::new(&backend, &mut store, Mode::Inference);

    let err = build_classifier(&mut g, &MetaTensor::new([1, 3, 128, 128]), Layout::ChannelFirst).unwrap_err();
    assert!(matches!(err, InceptionError::InvalidInput(_)));
    assert!(store.is_empty());
}
