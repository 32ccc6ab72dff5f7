use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gaugewatch::watch::{
    data::RecordSpec, extract::{extract, ValueRule}, parser::OutputParser, LabelRule, ScanPattern,
};

fn delimited_output(rows: usize) -> String {
    (0..rows)
        .map(|i| format!("\t{}:ssid-{}\n", i % 256, i))
        .collect()
}

fn markup_output(rows: usize) -> String {
    let mut html = String::from("<html><body><table><tbody>");
    html.push_str("<tr><td>Channel</td><td>ID</td><td>Frequency</td><td>Power</td></tr>");
    for i in 0..rows {
        html.push_str(&format!(
            "<tr><td>Downstream {i}</td><td>{}</td><td>{} MHz</td><td>-1.{} dBmV</td></tr>",
            70 + i,
            591 + 6 * i,
            i % 10
        ));
    }
    html.push_str("</tbody></table></body></html>");
    html
}

/// Benchmark delimited parsing at different output sizes
fn bench_delimited_parsing(c: &mut Criterion) {
    let specs = vec![RecordSpec::new("wifi", &["signal", "ssid"])];
    let mut group = c.benchmark_group("delimited_parsing");

    for rows in [8, 64, 512] {
        let output = delimited_output(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &output, |b, output| {
            b.iter(|| {
                OutputParser::Delimited
                    .parse(black_box(&specs), black_box(output.as_bytes()))
                    .expect("Should parse")
            })
        });
    }
    group.finish();
}

/// Benchmark markup table parsing at different output sizes
fn bench_markup_parsing(c: &mut Criterion) {
    let specs = vec![RecordSpec::new("downstream", &["channel", "id", "frequency", "power"])
        .with_header_row(true)
        .with_option("format", "table")
        .with_option("path", "table > tbody")];
    let mut group = c.benchmark_group("markup_parsing");

    for rows in [8, 32, 128] {
        let output = markup_output(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &output, |b, output| {
            b.iter(|| {
                OutputParser::Markup
                    .parse(black_box(&specs), black_box(output.as_bytes()))
                    .expect("Should parse")
            })
        });
    }
    group.finish();
}

/// Benchmark scanning and metric extraction
fn bench_extraction(c: &mut Criterion) {
    let pattern = ScanPattern::new("%f dBmV");
    c.bench_function("scan_f64", |b| {
        b.iter(|| pattern.scan_f64(black_box("  -3.2 dBmV")))
    });

    let specs = vec![RecordSpec::new("downstream", &["channel", "id", "frequency", "power"])
        .with_header_row(true)
        .with_option("format", "table")
        .with_option("path", "table > tbody")];
    let records = OutputParser::Markup
        .parse(&specs, markup_output(32).as_bytes())
        .expect("Should parse");
    let rows = &records["downstream"];
    let rule = ValueRule::new("modem", "downstream", "power")
        .with_format("%f dBmV")
        .with_label(LabelRule::new("id"))
        .with_label(LabelRule::new("frequency").with_format("%s MHz"));

    c.bench_function("extract_rows", |b| {
        b.iter(|| {
            rows.iter()
                .map(|row| extract(black_box(row), &rule))
                .collect::<Vec<_>>()
        })
    });
}

criterion_group!(
    benches,
    bench_delimited_parsing,
    bench_markup_parsing,
    bench_extraction
);
criterion_main!(benches);
