use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use saga::{SagaDefinition, SagaOrchestrator, StepError, step};

fn definition(steps: usize, fail_last: bool) -> SagaDefinition {
    (0..steps).fold(SagaDefinition::new("Bench"), |def, i| {
        let fail = fail_last && i + 1 == steps;
        def.step(step(
            format!("step_{i}"),
            move || async move {
                if fail {
                    Err(StepError::new("boom"))
                } else {
                    Ok(i)
                }
            },
            |_index: usize| async { Ok(()) },
        ))
    })
}

fn bench_successful_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = SagaOrchestrator::new();
    let mut group = c.benchmark_group("saga/success");

    for steps in [1, 6, 24] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            b.iter(|| {
                rt.block_on(async {
                    let result = orchestrator
                        .execute_saga(definition(steps, false))
                        .await
                        .unwrap();
                    assert!(result.success());
                });
            });
        });
    }
    group.finish();
}

fn bench_compensated_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = SagaOrchestrator::new();
    let mut group = c.benchmark_group("saga/compensated");

    for steps in [2, 6, 24] {
        group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, &steps| {
            b.iter(|| {
                rt.block_on(async {
                    let result = orchestrator
                        .execute_saga(definition(steps, true))
                        .await
                        .unwrap();
                    assert_eq!(result.compensations().len(), steps - 1);
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_successful_saga, bench_compensated_saga);
criterion_main!(benches);
