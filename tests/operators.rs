use briny_exec::capabilities::FixedProbe;
use briny_exec::error::SelectError;
use briny_exec::ops::OpKind;
use briny_exec::prelude::*;

fn context(backend: Backend, features: CpuFeatures) -> ExecutionContext {
    let probe = FixedProbe(CapabilitySet::new(features, 4));
    ExecutionContext::builder()
        .probe(&probe)
        .backend(backend)
        .build()
        .unwrap()
}

#[test]
fn cast_f32_to_u8_saturates() {
    for features in [CpuFeatures::NONE, CpuFeatures::VECTOR] {
        let ctx = context(Backend::Cpu, features);
        let src = Tensor::from_slice(
            TensorDescriptor::new([4], DataType::F32),
            &[1.5f32, 2.9, -1.0, 300.0],
        )
        .unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([4], DataType::U8)).unwrap();

        let mut cast = Cast::new(&ctx);
        cast.configure(&src, &dst, CastOptions::default()).unwrap();
        cast.run().unwrap();
        ctx.sync().unwrap();
        assert_eq!(dst.to_vec::<u8>().unwrap(), [2, 3, 0, 255]);
    }
}

#[test]
fn cast_rounds_ties_to_even_across_lanes() {
    let ctx = context(Backend::Queued, CpuFeatures::VECTOR);
    let values: Vec<f32> = (0..37).map(|i| i as f32 * 0.5 - 2.0).collect();
    let src = Tensor::from_slice(TensorDescriptor::new([37], DataType::F32), &values).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([37], DataType::U8)).unwrap();
    let mut cast = Cast::new(&ctx);
    cast.configure(&src, &dst, CastOptions::default()).unwrap();
    cast.run().unwrap();
    ctx.sync().unwrap();
    let expected: Vec<u8> = values
        .iter()
        .map(|v| v.round_ties_even().clamp(0.0, 255.0) as u8)
        .collect();
    assert_eq!(dst.to_vec::<u8>().unwrap(), expected);
}

#[test]
fn rank_mismatch_is_reported() {
    let ctx = context(Backend::Cpu, CpuFeatures::NONE);
    let src = Tensor::zeros(TensorDescriptor::new([2, 2, 2], DataType::F32)).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([4, 2], DataType::U8)).unwrap();
    let mut cast = Cast::new(&ctx);
    let err = cast
        .configure(&src, &dst, CastOptions::default())
        .unwrap_err();
    assert_eq!(
        err,
        ConfigError::RankMismatch {
            op: OpKind::Cast,
            src: 3,
            dst: 2
        }
    );
    assert!(!cast.is_configured());
}

#[test]
fn validate_agrees_with_configure() {
    let ctx = context(Backend::Cpu, CpuFeatures::NONE);
    let f32_2x3 = Tensor::zeros(TensorDescriptor::new([2, 3], DataType::F32)).unwrap();
    let f32_3x2 = Tensor::zeros(TensorDescriptor::new([3, 2], DataType::F32)).unwrap();
    let u8_2x3 = Tensor::zeros(TensorDescriptor::new([2, 3], DataType::U8)).unwrap();
    let f16_2x3 = Tensor::zeros(TensorDescriptor::new([2, 3], DataType::F16)).unwrap();

    let cases = [
        (&f32_2x3, &u8_2x3),
        (&f32_2x3, &f32_3x2),
        (&f32_2x3, &f32_2x3),
        (&f16_2x3, &f32_2x3),
        (&u8_2x3, &f32_3x2),
    ];
    for (src, dst) in cases {
        let options = CastOptions::default();
        let mut cast = Cast::new(&ctx);
        let verdict = cast.validate(src, dst, &options);
        assert_eq!(verdict, cast.configure(src, dst, options));
        assert_eq!(cast.is_configured(), verdict.is_ok());

        let mut transpose = Transpose::new(&ctx);
        let verdict = transpose.validate(src, dst, &());
        assert_eq!(verdict, transpose.configure(src, dst, ()));
    }
}

#[test]
fn failed_configure_keeps_previous_binding() {
    let ctx = context(Backend::Cpu, CpuFeatures::NONE);
    let src = Tensor::from_slice(TensorDescriptor::new([1, 2], DataType::S16), &[3i16, 4]).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([2, 1], DataType::S16)).unwrap();
    let wrong = Tensor::zeros(TensorDescriptor::new([1, 2], DataType::S16)).unwrap();

    let mut transpose = Transpose::new(&ctx);
    transpose.configure(&src, &dst, ()).unwrap();
    assert!(transpose.configure(&src, &wrong, ()).is_err());
    transpose.run().unwrap();
    assert_eq!(dst.to_vec::<i16>().unwrap(), [3, 4]);
}

#[test]
fn repeated_runs_are_idempotent() {
    for backend in [Backend::Cpu, Backend::Queued] {
        let ctx = context(backend, CpuFeatures::VECTOR);
        let data: Vec<u8> = (0..64).map(|v| (v * 7 % 251) as u8).collect();
        let src = Tensor::from_slice(TensorDescriptor::new([8, 8], DataType::U8), &data).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([8, 8], DataType::U8)).unwrap();
        let mut filter = Filter3x3::new(&ctx);
        filter
            .configure(&src, &dst, FilterOptions {
                kind: FilterKind::Gaussian,
                border: BorderMode::Constant(10.0),
            })
            .unwrap();

        filter.run().unwrap();
        ctx.sync().unwrap();
        let first = dst.to_vec::<u8>().unwrap();
        filter.run().unwrap();
        filter.run().unwrap();
        ctx.sync().unwrap();
        assert_eq!(dst.to_vec::<u8>().unwrap(), first, "{backend}");
    }
}

#[test]
fn backends_agree() {
    let data: Vec<f32> = (0..2 * 3 * 6 * 6).map(|v| (v % 13) as f32).collect();
    let mut outputs = Vec::new();
    for backend in [Backend::Cpu, Backend::Queued] {
        let ctx = context(backend, CpuFeatures::NONE);
        let src = Tensor::from_slice(TensorDescriptor::new([2, 3, 6, 6], DataType::F32), &data).unwrap();
        let options = PoolingOptions::new(PoolKind::Avg, (3, 3))
            .with_strides((2, 2))
            .with_padding(Padding::uniform(1))
            .exclude_padding(false);
        let shape = options.output_shape(src.descriptor()).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new(shape, DataType::F32)).unwrap();
        let mut pool = Pooling2d::new(&ctx);
        pool.configure(&src, &dst, options).unwrap();
        pool.run().unwrap();
        ctx.sync().unwrap();
        outputs.push(dst.to_vec::<f32>().unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn workspace_allocation_fails_at_run() {
    let probe = FixedProbe(CapabilitySet::new(CpuFeatures::NONE, 2));
    let ctx = ExecutionContext::builder()
        .probe(&probe)
        .workspace_limit(16)
        .build()
        .unwrap();
    let src = Tensor::zeros(TensorDescriptor::new([8, 8], DataType::F32)).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([8, 8], DataType::F32)).unwrap();
    let mut filter = Filter3x3::new(&ctx);
    let options = FilterOptions {
        kind: FilterKind::Box,
        border: BorderMode::Replicate,
    };
    filter.validate(&src, &dst, &options).unwrap();
    filter.configure(&src, &dst, options).unwrap();
    match filter.run() {
        Err(RuntimeError::Allocation { op, bytes, .. }) => {
            assert_eq!(op, OpKind::Filter3x3);
            assert_eq!(bytes, 10 * 10 * 4);
        }
        other => panic!("expected an allocation failure, got {other:?}"),
    }
}

#[test]
#[should_panic(expected = "not configured")]
fn run_before_configure_panics() {
    let ctx = context(Backend::Cpu, CpuFeatures::NONE);
    let mut tile = Tile::new(&ctx);
    let _ = tile.run();
}

#[test]
fn half_precision_depends_on_fp16() {
    let src = Tensor::zeros(TensorDescriptor::new([1, 1, 4, 4], DataType::F16)).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([1, 1, 2, 2], DataType::F16)).unwrap();
    let options = PoolingOptions::new(PoolKind::Max, (2, 2));

    let plain = context(Backend::Cpu, CpuFeatures::VECTOR);
    match Pooling2d::new(&plain).validate(&src, &dst, &options) {
        Err(ConfigError::Unsupported {
            source: SelectError::MissingCapabilities { required, available, .. },
            ..
        }) => {
            assert_eq!(required, [CpuFeatures::FP16]);
            assert_eq!(available, CpuFeatures::VECTOR);
        }
        other => panic!("expected missing capabilities, got {other:?}"),
    }

    let fp16 = context(Backend::Cpu, CpuFeatures::FP16);
    assert!(Pooling2d::new(&fp16).validate(&src, &dst, &options).is_ok());
}

#[test]
fn portable_fallbacks_cover_every_plain_type() {
    let ctx = context(Backend::Cpu, CpuFeatures::NONE);
    let plain = [
        DataType::U8,
        DataType::S8,
        DataType::U16,
        DataType::S16,
        DataType::U32,
        DataType::S32,
        DataType::F32,
    ];
    for ty in plain {
        let src = Tensor::zeros(TensorDescriptor::new([2, 3], ty)).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([3, 2], ty)).unwrap();
        assert!(Transpose::new(&ctx).validate(&src, &dst, &()).is_ok(), "{ty}");
        let tiled = Tensor::zeros(TensorDescriptor::new([4, 3], ty)).unwrap();
        let options = TileOptions { multiples: vec![2, 1] };
        assert!(Tile::new(&ctx).validate(&src, &tiled, &options).is_ok(), "{ty}");
    }
}
