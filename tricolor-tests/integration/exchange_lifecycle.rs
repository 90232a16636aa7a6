//! The running exchange on a paused clock.

use std::time::Duration;

use tokio::time::sleep;
use tricolor_core::{BufferMode, Color, Exchange, ExchangeConfig, TransitConfig};

fn exchange(config: ExchangeConfig) -> Exchange {
    Exchange::new(config).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_idle_terminal_never_sends() {
    let mut config = ExchangeConfig::for_testing();
    config.terminals.red = config.terminals.red.with_rate(0.0).unwrap();
    let exchange = exchange(config);

    exchange.start().unwrap();
    sleep(Duration::from_millis(10_500)).await;

    let snapshot = exchange.snapshot();
    let red = snapshot.terminal(Color::Red);
    assert_eq!(red.sent[Color::Blue], 0);
    assert_eq!(red.sent[Color::Yellow], 0);
    assert_eq!(red.received, 0);
    assert!(snapshot.black_box.received > 0);
    assert!(snapshot.running);

    exchange.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_settles_and_restart_resumes() {
    let exchange = exchange(ExchangeConfig::for_testing());

    assert!(exchange.start().unwrap());
    assert!(!exchange.start().unwrap());
    sleep(Duration::from_millis(5_500)).await;

    assert!(exchange.stop().await);
    assert!(!exchange.stop().await);
    exchange.drain().await;
    let stopped = exchange.snapshot();
    assert!(!stopped.running);
    assert_eq!(stopped.in_flight, 0);
    assert!(stopped.is_balanced());

    sleep(Duration::from_secs(5)).await;
    assert_eq!(exchange.snapshot(), stopped);

    exchange.start().unwrap();
    sleep(Duration::from_millis(3_500)).await;
    exchange.stop().await;
    exchange.drain().await;
    assert!(exchange.snapshot().black_box.received > stopped.black_box.received);
}

#[tokio::test(start_paused = true)]
async fn test_switch_discards_tokens_in_flight() {
    let config = ExchangeConfig {
        transit: TransitConfig::default(),
        ..ExchangeConfig::for_testing()
    };
    let exchange = exchange(config);

    exchange.start().unwrap();
    // First arrivals land at 3.6s.
    sleep(Duration::from_millis(3_500)).await;
    exchange.switch_mode(BufferMode::Separate);
    exchange.stop().await;
    assert!(exchange.in_flight() > 0);

    exchange.drain().await;
    let snapshot = exchange.snapshot();
    assert_eq!(snapshot.black_box.received, 0);
    assert_eq!(snapshot.current_buffer_count(), 0);
    assert_eq!(snapshot.mode, BufferMode::Separate);
    assert_eq!(snapshot.generation, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_restores_configuration() {
    let exchange = exchange(ExchangeConfig::for_testing());

    exchange.start().unwrap();
    exchange.update_capacity(3);
    exchange.update_rate(Color::Blue, 5.0).unwrap();
    exchange.switch_mode(BufferMode::Separate);
    sleep(Duration::from_secs(4)).await;
    assert!(exchange.snapshot().black_box.received > 0);

    exchange.reset().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.mode, BufferMode::Separate);
    assert_eq!(snapshot.capacity, 10);
    assert_eq!(snapshot.current_buffer_count(), 0);
    assert_eq!(snapshot.black_box.received, 0);
    assert_eq!(snapshot.black_box.sent, 0);
    assert_eq!(snapshot.black_box.overflow_total, 0);
    assert_eq!(exchange.schedule(Color::Blue).rate(), 1.0);
    for color in Color::ALL {
        assert_eq!(snapshot.terminal(color).sent.total(), 0);
        assert_eq!(snapshot.terminal(color).received, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_balanced_while_running() {
    let config = ExchangeConfig {
        transit: TransitConfig::default(),
        ..ExchangeConfig::for_testing()
    };
    let exchange = exchange(config);
    for color in Color::ALL {
        exchange.update_rate(color, 4.0).unwrap();
    }

    exchange.start().unwrap();
    for _ in 0..40 {
        sleep(Duration::from_millis(333)).await;
        let snapshot = exchange.snapshot();
        assert!(snapshot.is_balanced(), "{snapshot}");
        assert!(snapshot.current_buffer_count() <= snapshot.capacity);
    }
    exchange.stop().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    for color in Color::ALL {
        assert_eq!(snapshot.terminal(color).sent[color], 0);
        assert!(snapshot.terminal(color).sent.total() > 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_vanishing_rate_parks_loops_until_rate_restored() {
    let exchange = exchange(ExchangeConfig::for_testing());

    exchange.start().unwrap();
    exchange.update_rate(Color::Red, 1e-20).unwrap();
    sleep(Duration::from_secs(3)).await;
    let parked = exchange.snapshot().terminal(Color::Red).sent.total();

    exchange.update_rate(Color::Red, 2.0).unwrap();
    sleep(Duration::from_secs(10)).await;
    exchange.stop().await;
    exchange.drain().await;

    let red = exchange.snapshot().terminal(Color::Red).sent.total();
    assert_eq!(parked, 0);
    assert!(red > 0, "red sent nothing after restoring the rate");
}

#[tokio::test]
async fn test_invalid_control_input_is_refused() {
    let exchange = exchange(ExchangeConfig::for_testing());

    assert!(exchange.update_rate(Color::Red, f64::NAN).is_err());
    assert!(exchange.update_rate(Color::Red, -0.5).is_err());
    assert!(exchange.update_ratio(Color::Yellow, 1.01).is_err());
    assert_eq!(exchange.schedule(Color::Red).rate(), 1.0);
    assert_eq!(exchange.schedule(Color::Yellow).ratio(), 0.5);
}
