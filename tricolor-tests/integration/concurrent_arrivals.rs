//! Many tasks hitting one black box at once.

use std::sync::Arc;

use futures::future::join_all;
use tricolor_core::{
    Admission, BlackBox, BufferMode, BufferOccupancy, Color, ExchangeConfig, OutputOutcome, TimedTransfer, Token,
    TransitConfig,
};

const ARRIVALS_PER_ORIGIN: usize = 200;

fn black_box(mode: BufferMode, capacity: usize) -> Arc<BlackBox> {
    let mut config = ExchangeConfig::for_testing();
    config.buffer.mode = mode;
    config.buffer.capacity = capacity;
    Arc::new(BlackBox::new(&config))
}

async fn flood(black_box: &Arc<BlackBox>) -> Vec<Admission> {
    let mut tasks = Vec::new();
    for origin in Color::ALL {
        for i in 0..ARRIVALS_PER_ORIGIN {
            let black_box = Arc::clone(black_box);
            let (first, second) = origin.emission_pair();
            let color = if i % 2 == 0 { first } else { second };
            tasks.push(tokio::spawn(async move {
                let token = Token::new(color, origin, black_box.next_serial());
                black_box.receive_from(origin, token, black_box.generation())
            }));
        }
    }

    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_capacity_holds_under_contention() {
    let black_box = black_box(BufferMode::Shared, 5);

    let admissions = flood(&black_box).await;

    let accepted = admissions.iter().filter(|a| a.is_accepted()).count();
    assert_eq!(accepted, 5);
    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.black_box.received, 3 * ARRIVALS_PER_ORIGIN as u64);
    assert_eq!(snapshot.black_box.overflow_total, 595);
    assert_eq!(snapshot.black_box.overflow.total(), 595);
    assert_eq!(snapshot.admitted_total(), 5);
    assert_eq!(snapshot.current_buffer_count(), 5);
    assert!(snapshot.is_balanced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_capacity_holds_under_contention() {
    let black_box = black_box(BufferMode::Separate, 7);

    let admissions = flood(&black_box).await;

    assert_eq!(admissions.iter().filter(|a| a.is_accepted()).count(), 21);
    let snapshot = black_box.snapshot();
    let BufferOccupancy::Separate { by_color } = snapshot.buffer else {
        panic!("expected separate occupancy, got {}", snapshot.buffer);
    };
    for color in Color::ALL {
        assert_eq!(by_color[color], 7);
    }
    assert!(snapshot.is_balanced());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outputs_deliver_each_token_once() {
    let black_box = black_box(BufferMode::Shared, 30);
    flood(&black_box).await;

    let mut tasks = Vec::new();
    for color in Color::ALL {
        for _ in 0..30 {
            let black_box = Arc::clone(&black_box);
            tasks.push(tokio::spawn(async move {
                black_box
                    .output(color, &TimedTransfer, &TransitConfig::instant())
                    .await
            }));
        }
    }
    let outcomes: Vec<OutputOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let delivered = outcomes
        .iter()
        .filter(|&&outcome| outcome == OutputOutcome::Delivered)
        .count();
    assert_eq!(delivered, 30);
    let snapshot = black_box.snapshot();
    assert_eq!(snapshot.black_box.sent, 30);
    assert_eq!(snapshot.delivered_total(), 30);
    assert_eq!(snapshot.current_buffer_count(), 0);
    assert!(snapshot.is_balanced());
}
