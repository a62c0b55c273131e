use std::thread;
use std::time::Duration;

use rails::{assemble, Engine, EngineError, StopCondition, StopReason};

const SUM: &str = include_str!("files/sum.rails");

#[test]
fn io_stops_then_exit() {
    let engine = Engine::new();
    engine.load_program(&assemble(SUM).unwrap()).unwrap();

    let reason = engine.run_until(StopCondition::Io).unwrap().join();
    assert!(matches!(reason, StopReason::Condition(instr) if instr.to_string() == "OUT 0 r2"));
    assert_eq!(engine.state().out_regs()[0], 0);

    let reason = engine.run_until(StopCondition::Exit).unwrap().join();
    assert!(matches!(reason, StopReason::Condition(instr) if instr.is_exit()));
    let state = engine.state();
    assert_eq!(state.out_regs()[0], 15);
    assert_eq!(state.pc(), 8);
}

#[test]
fn inspect_and_feed_input_while_running() {
    let engine = Engine::new();
    let image = assemble(
        r#"
        # Wait until port 2 reads 1, then copy port 3 out
        IMM r1 1
        wait: IN r15 2
              BEQ go: r1
              JMP wait:
        go:   IN r4 3
              OUT 5 r4
              EXIT
        "#,
    )
    .unwrap();
    engine.load_program(&image).unwrap();

    let run = engine.run_until(StopCondition::Exit).unwrap();
    for _ in 0..20 {
        let state = engine.state();
        assert_eq!(state.reg(0), 0);
        assert!(state.pc() <= 3);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(engine.is_busy());
    assert_eq!(engine.step(), Err(EngineError::Busy));

    engine.set_input(3, 99);
    engine.set_input(2, 1);
    assert!(matches!(run.join(), StopReason::Condition(_)));
    assert_eq!(engine.state().out_regs()[5], 99);
    assert!(!engine.is_busy());
}

#[test]
fn snapshot_moves_state_between_engines() {
    let first = Engine::new();
    first.load_program(&assemble(SUM).unwrap()).unwrap();
    first.run_until(StopCondition::Io).unwrap().join();

    let second = Engine::new();
    second.snapshot_load(&first.snapshot_save()).unwrap();
    second.run_until(StopCondition::Exit).unwrap().join();
    assert_eq!(second.state().out_regs()[0], 15);
    // Original is untouched
    assert_eq!(first.state().out_regs()[0], 0);
}
