use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use opus_core::attacks::AttackTables;
use opus_core::config::EngineConfig;
use opus_core::evaluation::PstEvaluator;
use opus_core::move_generator::MoveGenerator;
use opus_core::perft::perft;
use opus_core::position::{Position, STARTING_FEN};
use opus_core::search::{SearchEngine, SearchParams};
use opus_core::zobrist::ZobristKeys;

struct BenchCase {
    name: &'static str,
    fen: &'static str,
    depth: u32,
    expected_nodes: u64,
}

const CASES: &[BenchCase] = &[
    BenchCase { name: "startpos", fen: STARTING_FEN, depth: 4, expected_nodes: 197_281 },
    BenchCase {
        name: "kiwipete",
        fen: "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        depth: 3,
        expected_nodes: 97_862,
    },
    BenchCase {
        name: "position_3",
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        depth: 4,
        expected_nodes: 43_238,
    },
    BenchCase {
        name: "position_5",
        fen: "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        depth: 3,
        expected_nodes: 62_379,
    },
];

fn bench_perft(c: &mut Criterion) {
    let keys = Arc::new(ZobristKeys::new());
    let movegen = MoveGenerator::new(Arc::new(AttackTables::new()));

    let mut group = c.benchmark_group("perft");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(4));
    group.sample_size(10);

    for case in CASES {
        let mut pos = Position::from_fen(case.fen, Arc::clone(&keys)).expect("benchmark FEN should parse");
        assert_eq!(
            perft(&movegen, &mut pos, case.depth),
            case.expected_nodes,
            "node mismatch for {} depth {}",
            case.name,
            case.depth
        );

        group.throughput(Throughput::Elements(case.expected_nodes));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_d{}", case.name, case.depth)),
            &case.depth,
            |b, &depth| b.iter(|| black_box(perft(&movegen, &mut pos, black_box(depth)))),
        );
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let keys = Arc::new(ZobristKeys::new());
    let tables = Arc::new(AttackTables::new());
    let mut engine = SearchEngine::new(EngineConfig::default(), tables, PstEvaluator::new());

    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    group.bench_function("startpos_d6", |b| {
        b.iter(|| {
            let mut pos = Position::startpos(Arc::clone(&keys));
            engine.new_game();
            black_box(engine.run(&mut pos, &SearchParams::depth(6), |_| {}).nodes)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_perft, bench_search);
criterion_main!(benches);
