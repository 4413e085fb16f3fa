use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use storyline::provider::{DynamicRulesetProvider, RulesetProvider};
use storyline::registry::TypeRegistry;
use storyline::ruleset::Ruleset;
use storyline::story::{LogSeverity, Story};

// n name-pattern rules that never match the benchmarked story, then a catch-all
fn definitions(n: usize) -> String {
    let mut records: Vec<String> = (0..n)
        .map(|i| format!(r#"{{"ruleType":"namePattern","pattern":"^job-{i}$","handlerType":"trace"}}"#))
        .collect();
    records.push(r#"{"ruleType":"minimumSeverity","minimumSeverity":"Error","handlerType":"console"}"#.to_string());
    records.push(r#"{"ruleType":"always","handlerType":"trace"}"#.to_string());
    format!("[{}]", records.join(","))
}

fn story_with_log(entries: usize) -> Arc<Story> {
    let provider: Arc<dyn RulesetProvider> =
        Arc::new(DynamicRulesetProvider::new(TypeRegistry::global(), Ruleset::empty()));
    let story = Story::new("benchmark", provider).unwrap();
    for i in 0..entries {
        story.log().log(LogSeverity::Info, format!("entry {i}"));
    }
    story
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let registry = TypeRegistry::global();

    let story = story_with_log(10);
    let ruleset = Ruleset::empty();
    c.bench_function("evaluate empty", |b| b.iter(|| ruleset.evaluate(black_box(&story))));

    let ruleset = registry.parse(&definitions(0)).unwrap().ruleset;
    c.bench_function("evaluate 2 rules", |b| b.iter(|| ruleset.evaluate(black_box(&story))));

    let ruleset = registry.parse(&definitions(100)).unwrap().ruleset;
    c.bench_function("evaluate 102 rules", |b| b.iter(|| ruleset.evaluate(black_box(&story))));

    let long = story_with_log(10_000);
    let ruleset = registry.parse(&definitions(0)).unwrap().ruleset;
    c.bench_function("evaluate 2 rules, 10k entries", |b| b.iter(|| ruleset.evaluate(black_box(&long))));

    let text = definitions(100);
    c.bench_function("parse 102 rules", |b| b.iter(|| registry.parse(black_box(&text))));

    let provider = DynamicRulesetProvider::new(TypeRegistry::global(), Ruleset::empty());
    provider.reconfigure(&text).unwrap();
    c.bench_function("load current ruleset", |b| b.iter(|| black_box(provider.ruleset())));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
