//! Benchmarks for netlist lexing and parsing.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use spicefront_parser::{NetlistReader, ReaderOptions, SpiceLexer, Symbol};

/// A ladder of `n` RC sections with a parameterised resistor value.
fn ladder(n: usize) -> String {
    let mut text = String::from("RC ladder\n.param r=1k c=1n\nV1 n0 0 PULSE(0 1 1n 1n 1n 10n 20n)\n");
    for i in 0..n {
        text.push_str(&format!("R{i} n{i} n{} {{r*1.01}}\n", i + 1));
        text.push_str(&format!("C{i} n{} 0 {{c}}\n", i + 1));
    }
    text.push_str(".tran 1n 100n\n.end\n");
    text
}

fn bench_lexer(c: &mut Criterion) {
    let text = ladder(500);
    let lexer = SpiceLexer::new(&ReaderOptions::default()).unwrap();
    c.bench_function("lex_rc_ladder_500", |b| {
        b.iter(|| lexer.tokenize(black_box(&text)).unwrap().len());
    });
}

fn bench_read(c: &mut Criterion) {
    let text = ladder(500);
    let reader = NetlistReader::new(ReaderOptions::default()).unwrap();
    c.bench_function("read_rc_ladder_500", |b| {
        b.iter(|| reader.read(black_box(&text)).unwrap().statements.len());
    });

    c.bench_function("read_parameter_list", |b| {
        b.iter(|| {
            reader
                .read_symbol(black_box("pulse(0 1 1n 1n 1n 10n 20n) a=1 b={a*2} v(out,0)=3"), Symbol::Parameters)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_lexer, bench_read);
criterion_main!(benches);
