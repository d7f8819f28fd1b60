use std::sync::{Arc, OnceLock};

use opus_core::attacks::AttackTables;
use opus_core::move_generator::MoveGenerator;
use opus_core::perft::{perft, split_perft};
use opus_core::position::{Position, STARTING_FEN};
use opus_core::zobrist::ZobristKeys;

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
const POSITION_3: &str = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
const POSITION_4: &str = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
const POSITION_5: &str = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";

fn movegen() -> MoveGenerator {
    static TABLES: OnceLock<Arc<AttackTables>> = OnceLock::new();
    MoveGenerator::new(TABLES.get_or_init(|| Arc::new(AttackTables::new())).clone())
}

fn keys() -> Arc<ZobristKeys> {
    static KEYS: OnceLock<Arc<ZobristKeys>> = OnceLock::new();
    KEYS.get_or_init(|| Arc::new(ZobristKeys::new())).clone()
}

fn check(fen: &str, expected: &[u64]) {
    let mg = movegen();
    let mut pos = Position::from_fen(fen, keys()).expect("valid FEN");
    let hash = pos.hash();
    for (depth, &nodes) in expected.iter().enumerate() {
        let depth = depth as u32 + 1;
        assert_eq!(perft(&mg, &mut pos, depth), nodes, "{fen} depth {depth}");
        assert_eq!(pos.hash(), hash);
    }
}

#[test]
fn start_position() {
    check(STARTING_FEN, &[20, 400, 8902, 197_281]);
}

#[test]
fn kiwipete() {
    check(KIWIPETE, &[48, 2039, 97_862]);
}

#[test]
fn position_3() {
    check(POSITION_3, &[14, 191, 2812, 43_238]);
}

#[test]
fn position_4() {
    check(POSITION_4, &[6, 264, 9467]);
}

#[test]
fn position_5() {
    check(POSITION_5, &[44, 1486, 62_379]);
}

#[test]
fn split_perft_of_start_position() {
    let mg = movegen();
    let mut pos = Position::startpos(keys());
    let divide = split_perft(&mg, &mut pos, 3);
    assert_eq!(divide.len(), 20);
    assert_eq!(divide.iter().map(|(_, n)| n).sum::<u64>(), 8902);

    let e2e4 = divide.iter().find(|(mv, _)| mv.to_uci() == "e2e4").expect("e2e4 is a root move");
    assert_eq!(e2e4.1, 600);
}
