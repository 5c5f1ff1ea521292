use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;
use viewer_probe::{DomContract, HighlightInspector, PageProbe, SearchDriver, StubPage, Timing};

fn loaded_probe() -> PageProbe {
    let page = StubPage::sample().with_debounce(Duration::ZERO);
    let mut probe = PageProbe::new(Box::new(page), Timing::fast().with_quiet_window(Duration::from_millis(10)));
    probe.navigate("http://stub/").unwrap();
    probe
}

fn benchmark_probe(c: &mut Criterion) {
    let contract = DomContract::default();
    let inspector = HighlightInspector::new(&contract).unwrap();
    let mut probe = loaded_probe();

    c.bench_function("peek_search_input", |b| {
        b.iter(|| {
            let result = probe.peek(black_box(&contract.search_input));
            assert!(result.found());
        })
    });

    c.bench_function("list_highlights", |b| {
        b.iter(|| black_box(inspector.list_highlights(&mut probe)))
    });
}

fn benchmark_settle(c: &mut Criterion) {
    let contract = DomContract::default();
    let mut search = SearchDriver::new(&contract).unwrap();
    let mut probe = loaded_probe();

    let mut group = c.benchmark_group("settle");
    group.sample_size(10);
    group.bench_function("set_and_clear_term", |b| {
        b.iter(|| {
            search.set_term(&mut probe, black_box("cerebellar"), 1).unwrap();
            search.clear(&mut probe).unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_probe, benchmark_settle);
criterion_main!(benches);
