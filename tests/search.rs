use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use opus_core::attacks::AttackTables;
use opus_core::config::EngineConfig;
use opus_core::evaluation::PstEvaluator;
use opus_core::position::Position;
use opus_core::search::{mate_in, SearchEngine, SearchParams, MATE_SCORE};
use opus_core::zobrist::ZobristKeys;

fn tables() -> Arc<AttackTables> {
    static TABLES: OnceLock<Arc<AttackTables>> = OnceLock::new();
    TABLES.get_or_init(|| Arc::new(AttackTables::new())).clone()
}

fn engine() -> SearchEngine {
    SearchEngine::new(EngineConfig::new(8, 1), tables(), PstEvaluator::new())
}

fn pos(fen: &str) -> Position {
    Position::from_fen(fen, Arc::new(ZobristKeys::new())).expect("valid FEN")
}

fn assert_legal_result(fen: &str, depth: i32) {
    let mut engine = engine();
    let mut p = pos(fen);
    let result = engine.run(&mut p, &SearchParams::depth(depth), |_| {});
    assert_eq!(p.to_fen(), fen, "search must restore the position");

    let legal = engine.move_generator().legal_moves(&mut p);
    assert!(legal.contains(result.best_move), "{fen}: {} is not legal", result.best_move);
    assert_eq!(result.pv.first().copied(), Some(result.best_move));

    // Every PV move is legal in turn
    for &mv in &result.pv {
        let legal = engine.move_generator().legal_moves(&mut p);
        assert!(legal.contains(mv), "{fen}: pv move {mv} is not legal");
        p.make_move(mv);
    }
}

#[test]
fn returned_moves_are_legal() {
    for fen in [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        "4k3/8/8/8/8/8/4p3/R3K3 b Q - 0 1",
    ] {
        assert_legal_result(fen, 5);
    }
}

#[test]
fn mate_in_one_for_black() {
    let mut engine = engine();
    let mut p = pos("r5k1/8/8/8/8/8/5PPP/6K1 b - - 0 1");
    let result = engine.run(&mut p, &SearchParams::depth(1), |_| {});
    assert_eq!(result.best_move.to_uci(), "a8a1");
    assert_eq!(result.score, MATE_SCORE - 1);
}

#[test]
fn finds_mate_in_two() {
    // Qd8+ Rxd8 Rxd8#
    let mut engine = engine();
    let mut p = pos("r5k1/5ppp/8/8/3Q4/8/5PPP/3R2K1 w - - 0 1");
    let result = engine.run(&mut p, &SearchParams::depth(5), |_| {});
    assert_eq!(result.best_move.to_uci(), "d4d8");
    assert_eq!(mate_in(result.score), Some(2));
}

#[test]
fn stop_flag_ends_infinite_search() {
    let mut engine = engine();
    let stop = engine.stop_handle();
    let mut p = Position::startpos(Arc::new(ZobristKeys::new()));

    // run() clears the flag on entry, so a stop raised from the callback
    // ends the search after the first completed iteration.
    let result = engine.run(&mut p, &SearchParams { infinite: true, ..Default::default() }, |_| {
        stop.store(true, Ordering::Relaxed);
    });
    assert!(result.depth >= 1);
    let legal = engine.move_generator().legal_moves(&mut p);
    assert!(legal.contains(result.best_move));
}

#[test]
fn movetime_is_respected() {
    let mut engine = engine();
    let mut p = Position::startpos(Arc::new(ZobristKeys::new()));
    let start = std::time::Instant::now();
    let params = SearchParams { movetime: Some(100), ..Default::default() };
    let result = engine.run(&mut p, &params, |_| {});
    assert!(start.elapsed().as_millis() < 2000);
    assert!(!result.best_move.is_null());
}
