//! Admission, overflow and delivery accounting through the black box.

use tricolor_core::{
    Admission, BlackBox, BufferMode, Color, ExchangeConfig, OutputOutcome, TimedTransfer, Token,
    TransitConfig,
};

fn black_box(mode: BufferMode, capacity: usize) -> BlackBox {
    let mut config = ExchangeConfig::for_testing();
    config.buffer.mode = mode;
    config.buffer.capacity = capacity;
    BlackBox::new(&config)
}

fn arrive(black_box: &BlackBox, color: Color, origin: Color) -> Option<Admission> {
    let token = Token::new(color, origin, black_box.next_serial());
    black_box.receive_from(origin, token, black_box.generation())
}

#[tokio::test]
async fn test_shared_buffer_of_two() {
    let black_box = black_box(BufferMode::Shared, 2);

    assert_eq!(
        arrive(&black_box, Color::Blue, Color::Red),
        Some(Admission::Accepted)
    );
    assert_eq!(
        arrive(&black_box, Color::Yellow, Color::Red),
        Some(Admission::Accepted)
    );
    assert_eq!(
        arrive(&black_box, Color::Red, Color::Blue),
        Some(Admission::Rejected)
    );

    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.black_box.received, 3);
    assert_eq!(snapshot.black_box.overflow_total, 1);
    assert_eq!(snapshot.black_box.overflow[Color::Red], 1);
    assert_eq!(snapshot.black_box.overflow[Color::Blue], 0);
    assert_eq!(snapshot.terminal(Color::Red).sent[Color::Blue], 1);
    assert_eq!(snapshot.terminal(Color::Red).sent[Color::Yellow], 1);
    assert_eq!(snapshot.terminal(Color::Blue).sent.total(), 0);

    let outcome = black_box
        .output(Color::Blue, &TimedTransfer, &TransitConfig::instant())
        .await;
    assert_eq!(outcome, OutputOutcome::Delivered);

    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.current_buffer_count(), 1);
    assert_eq!(snapshot.buffer.total(), 1);
    assert_eq!(snapshot.black_box.sent, 1);
    assert_eq!(snapshot.terminal(Color::Blue).received, 1);
    assert!(snapshot.is_balanced());
}

#[test]
fn test_separate_buffer_of_one() {
    let black_box = black_box(BufferMode::Separate, 1);

    assert_eq!(
        arrive(&black_box, Color::Red, Color::Blue),
        Some(Admission::Accepted)
    );
    assert_eq!(
        arrive(&black_box, Color::Red, Color::Yellow),
        Some(Admission::Rejected)
    );
    assert_eq!(
        arrive(&black_box, Color::Blue, Color::Red),
        Some(Admission::Accepted)
    );

    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.black_box.overflow[Color::Red], 1);
    assert_eq!(snapshot.black_box.overflow_total, 1);
    assert_eq!(snapshot.current_buffer_count(), 2);
    assert_eq!(snapshot.terminal(Color::Yellow).sent.total(), 0);
}

#[tokio::test]
async fn test_empty_output_changes_nothing() {
    let black_box = black_box(BufferMode::Shared, 4);
    arrive(&black_box, Color::Blue, Color::Red);
    let before = black_box.snapshot();

    let outcome = black_box
        .output(Color::Yellow, &TimedTransfer, &TransitConfig::instant())
        .await;

    assert_eq!(outcome, OutputOutcome::Empty);
    assert_eq!(black_box.snapshot(), before);
}

#[test]
fn test_switch_to_same_mode_clears_and_keeps_counters() {
    let black_box = black_box(BufferMode::Shared, 2);
    for _ in 0..3 {
        arrive(&black_box, Color::Yellow, Color::Blue);
    }
    let before = black_box.snapshot();

    black_box.switch_mode(BufferMode::Shared);

    let after = black_box.snapshot();
    assert_eq!(after.current_buffer_count(), 0);
    assert_eq!(after.mode, BufferMode::Shared);
    assert_eq!(after.generation, before.generation + 1);
    assert_eq!(after.black_box, before.black_box);
    assert_eq!(after.terminals, before.terminals);
}

#[test]
fn test_arrival_from_before_a_switch_is_discarded() {
    let black_box = black_box(BufferMode::Shared, 2);
    let stale = black_box.generation();
    black_box.switch_mode(BufferMode::Separate);

    let token = Token::new(Color::Blue, Color::Red, black_box.next_serial());
    assert_eq!(black_box.receive_from(Color::Red, token, stale), None);

    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.black_box.received, 0);
    assert_eq!(snapshot.current_buffer_count(), 0);
}

#[test]
fn test_lowered_capacity_does_not_evict() {
    let black_box = black_box(BufferMode::Shared, 3);
    for _ in 0..3 {
        arrive(&black_box, Color::Red, Color::Yellow);
    }

    black_box.update_capacity(1);

    assert_eq!(black_box.snapshot().current_buffer_count(), 3);
    assert_eq!(
        arrive(&black_box, Color::Blue, Color::Yellow),
        Some(Admission::Rejected)
    );
}
