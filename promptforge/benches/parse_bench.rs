//! Benchmarks for the response parsers.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use promptforge::tasks::parse::{first_acceptable_line, split_variants, strip_reasoning};

const LOCAL_RESPONSE: &str = "<think>用户给了一个很长的 JSON 提示词，需要提取主体、场景和风格。\
主体是一个女孩，场景是霓虹灯下的街道，风格是赛博朋克。</think>\n\
思考：应该控制在三十字以内\n\
描述：“霓虹街头的赛博朋克女孩，夜景氛围”\n";

const AUGMENT_RESPONSE: &str = "夜色霓虹中的赛博少女\n\n都市霓虹灯下的未来感女孩\n第三条多余的变体";

fn parse_benchmark(c: &mut Criterion) {
    c.bench_function("strip_reasoning", |b| {
        b.iter(|| strip_reasoning(black_box(LOCAL_RESPONSE)));
    });
    c.bench_function("first_acceptable_line", |b| {
        b.iter(|| first_acceptable_line(black_box(LOCAL_RESPONSE)));
    });
    c.bench_function("split_variants", |b| {
        b.iter(|| split_variants(black_box(AUGMENT_RESPONSE)));
    });
}

criterion_group!(benches, parse_benchmark);
criterion_main!(benches);
