use briny_exec::capabilities::FixedProbe;
use briny_exec::dtype::DataType;
use briny_exec::ops::cpu::{border, cast, filter};
use briny_exec::ops::dispatch::KernelCatalog;
use briny_exec::ops::{KernelArgs, KernelCandidate, KernelParams, OpKind, OperandTypes, TypeSet};
use briny_exec::prelude::*;
use briny_exec::scheduler::Discipline;
use briny_exec::window::Window;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Border,
    Main,
}

static SPANS: Mutex<Vec<(Stage, Instant, Instant)>> = parking_lot::const_mutex(Vec::new());

fn timed_border(args: &KernelArgs<'_>, window: &Window) {
    let start = Instant::now();
    std::thread::sleep(Duration::from_millis(15));
    border::fill_border(args, window);
    SPANS.lock().push((Stage::Border, start, Instant::now()));
}

fn timed_filter(args: &KernelArgs<'_>, window: &Window) {
    let start = Instant::now();
    filter::filter3x3(args, window);
    SPANS.lock().push((Stage::Main, start, Instant::now()));
}

fn instrumented_catalog() -> KernelCatalog {
    let mut catalog = KernelCatalog::builtin();
    catalog
        .register(
            KernelCandidate::new("timed_border", OpKind::FillBorder, timed_border)
                .types(TypeSet::Same(&[DataType::U8]))
                .requires(CpuFeatures::VECTOR),
        )
        .register(
            KernelCandidate::new("timed_filter", OpKind::Filter3x3, timed_filter)
                .types(TypeSet::Same(&[DataType::U8]))
                .requires(CpuFeatures::VECTOR),
        );
    catalog
}

#[test]
fn border_completes_before_main_kernel_starts() {
    let probe = FixedProbe(CapabilitySet::new(CpuFeatures::VECTOR, 4));
    let ctx = ExecutionContext::builder()
        .probe(&probe)
        .backend(Backend::Queued)
        .catalog(instrumented_catalog())
        .build()
        .unwrap();
    assert_eq!(ctx.scheduler().discipline(), Discipline::Queued);

    let data: Vec<u8> = (0..16 * 16).map(|v| (v % 200) as u8).collect();
    let src = Tensor::from_slice(TensorDescriptor::new([16, 16], DataType::U8), &data).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([16, 16], DataType::U8)).unwrap();
    let mut op = Filter3x3::new(&ctx);
    op.configure(&src, &dst, FilterOptions {
        kind: FilterKind::Box,
        border: BorderMode::Replicate,
    })
    .unwrap();

    SPANS.lock().clear();
    op.run().unwrap();
    ctx.sync().unwrap();

    let spans = SPANS.lock().clone();
    let border_end = spans
        .iter()
        .filter(|s| s.0 == Stage::Border)
        .map(|s| s.2)
        .max()
        .unwrap();
    let main_start = spans
        .iter()
        .filter(|s| s.0 == Stage::Main)
        .map(|s| s.1)
        .min()
        .unwrap();
    assert!(spans.iter().filter(|s| s.0 == Stage::Border).count() > 1);
    assert!(border_end <= main_start);
}

const S32_TO_U8: &[OperandTypes] = &[OperandTypes::new(DataType::S32, DataType::U8)];

/// Saturating casts finish late so a following launch would overtake them.
fn slow_saturating_cast(args: &KernelArgs<'_>, window: &Window) {
    if matches!(args.params, KernelParams::Cast(ConvertPolicy::Saturate)) {
        std::thread::sleep(Duration::from_millis(40));
    }
    cast::cast_generic(args, window);
}

#[test]
fn reconfigured_operator_orders_after_previous_run() {
    let mut catalog = KernelCatalog::builtin();
    catalog.register(
        KernelCandidate::new("slow_saturating_cast", OpKind::Cast, slow_saturating_cast)
            .types(TypeSet::Pairs(S32_TO_U8))
            .requires(CpuFeatures::VECTOR),
    );
    let probe = FixedProbe(CapabilitySet::new(CpuFeatures::VECTOR, 2));
    let ctx = ExecutionContext::builder()
        .probe(&probe)
        .backend(Backend::Queued)
        .catalog(catalog)
        .build()
        .unwrap();

    let src = Tensor::from_slice(TensorDescriptor::new([1], DataType::S32), &[300i32]).unwrap();
    let dst = Tensor::zeros(TensorDescriptor::new([1], DataType::U8)).unwrap();
    let mut op = Cast::new(&ctx);
    op.configure(&src, &dst, CastOptions {
        policy: ConvertPolicy::Saturate,
    })
    .unwrap();
    op.run().unwrap();
    op.configure(&src, &dst, CastOptions { policy: ConvertPolicy::Wrap })
        .unwrap();
    op.run().unwrap();
    ctx.sync().unwrap();
    assert_eq!(dst.to_vec::<u8>().unwrap(), [44]);
}

#[test]
fn queued_results_match_synchronous_results() {
    let data: Vec<u8> = (0..12 * 20).map(|v| (v * 31 % 256) as u8).collect();
    let mut outputs = Vec::new();
    for backend in [Backend::Cpu, Backend::Queued] {
        let ctx = ExecutionContext::builder()
            .backend(backend)
            .max_workers(3)
            .build()
            .unwrap();
        let src = Tensor::from_slice(TensorDescriptor::new([12, 20], DataType::U8), &data).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([12, 20], DataType::U8)).unwrap();
        let mut op = Filter3x3::new(&ctx);
        op.configure(&src, &dst, FilterOptions {
            kind: FilterKind::Gaussian,
            border: BorderMode::Replicate,
        })
        .unwrap();
        op.run().unwrap();
        // host reads wait for pending launches
        outputs.push(dst.to_vec::<u8>().unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn chained_operators_on_the_queue() {
    let ctx = ExecutionContext::builder()
        .backend(Backend::Queued)
        .max_workers(2)
        .build()
        .unwrap();
    let src = Tensor::from_slice(TensorDescriptor::new([2, 3], DataType::S32), &[1i32, 2, 3, 4, 5, 6]).unwrap();
    let mid = Tensor::zeros(TensorDescriptor::new([3, 2], DataType::S32)).unwrap();
    let out = Tensor::zeros(TensorDescriptor::new([3, 2], DataType::F32)).unwrap();

    let mut transpose = Transpose::new(&ctx);
    transpose.configure(&src, &mid, ()).unwrap();
    let mut cast = Cast::new(&ctx);
    cast.configure(&mid, &out, CastOptions::default()).unwrap();

    transpose.run().unwrap();
    ctx.barrier().unwrap();
    cast.run().unwrap();
    ctx.sync().unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
}

#[test]
fn empty_tensors_launch_nothing() {
    for backend in [Backend::Cpu, Backend::Queued] {
        let ctx = ExecutionContext::builder().backend(backend).build().unwrap();
        let src = Tensor::zeros(TensorDescriptor::new([0, 4], DataType::F32)).unwrap();
        let dst = Tensor::zeros(TensorDescriptor::new([4, 0], DataType::F32)).unwrap();
        let mut transpose = Transpose::new(&ctx);
        transpose.configure(&src, &dst, ()).unwrap();
        transpose.run().unwrap();
        ctx.sync().unwrap();
        assert!(dst.to_vec::<f32>().unwrap().is_empty());
    }
}
