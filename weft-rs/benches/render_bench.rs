use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weft::template::comment::strip_comments;
use weft::template::grammar::parse;
use weft::template::mask::Masker;
use weft::Engine;

fn make_template(sections: usize) -> String {
    let mut s = String::from(
        "{card(title, body, tone=\"plain\")}\n## {{title}} ({{tone}})\n{{body}}\n{/card}\n\
         {n = 3}\n",
    );
    for i in 0..sections {
        s.push_str(&format!(
            "// section {i}\n{{{{card(\"Section {i}\", \"Body with `code {{{{x}}}}` inline\")}}}}\n\
             Total: {{{{n * {i} + 1}}}}\n```\nfenced {{{{not_a_slot}}}}\n```\n"
        ));
    }
    s
}

fn bench_render(c: &mut Criterion) {
    let small = make_template(10);
    let large = make_template(500);
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let engine = Engine::new();

    let mut g = c.benchmark_group("render");
    g.bench_function("small", |b| {
        b.iter(|| rt.block_on(engine.render_str(black_box(&small))))
    });
    g.bench_function("large", |b| {
        b.iter(|| rt.block_on(engine.render_str(black_box(&large))))
    });
    g.finish();

    let mut g = c.benchmark_group("stages_large");
    g.bench_function("mask", |b| {
        b.iter(|| Masker::new().mask(black_box(&large)))
    });
    let masked = Masker::new().mask(&large);
    g.bench_function("strip_comments", |b| {
        b.iter(|| strip_comments(black_box(&masked)))
    });
    let stripped = strip_comments(&masked);
    g.bench_function("parse", |b| b.iter(|| parse(black_box(&stripped))));
    g.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
