//! Lost tokens through simulated transit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tricolor_core::{
    Color, Endpoint, Exchange, ExchangeConfig, Token, Transfer, TransferFault, TransitConfig,
};
use tricolor_sim::SimulatedTransit;

fn exchange_over(transfer: Arc<dyn Transfer>) -> Exchange {
    let config = ExchangeConfig {
        transit: TransitConfig::default(),
        ..ExchangeConfig::for_testing()
    };
    Exchange::builder(config).transfer(transfer).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_total_loss_counts_nothing() {
    let transit = Arc::new(SimulatedTransit::builder().fault_rate(1.0).build());
    let exchange = exchange_over(transit.clone());

    exchange.start().unwrap();
    sleep(Duration::from_secs(10)).await;
    exchange.stop().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    assert_eq!(snapshot.black_box.received, 0);
    assert_eq!(snapshot.black_box.sent, 0);
    assert_eq!(snapshot.black_box.overflow_total, 0);
    assert_eq!(transit.stats().completed, 0);
    assert!(transit.stats().faulted >= 27);
}

#[tokio::test(start_paused = true)]
async fn test_partial_loss_stays_balanced() {
    let transit = Arc::new(
        SimulatedTransit::builder()
            .seed(99)
            .fault_rate(0.2)
            .jitter(Duration::from_millis(300))
            .build(),
    );
    let exchange = exchange_over(transit.clone());
    for color in Color::ALL {
        exchange.update_rate(color, 3.0).unwrap();
    }

    exchange.start().unwrap();
    sleep(Duration::from_secs(30)).await;
    exchange.stop().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    let stats = transit.stats();
    assert!(stats.faulted > 0);
    assert!(snapshot.black_box.received > 0);
    assert!(snapshot.is_balanced(), "{snapshot}");
}

/// Loses only outbound trips, so every token is counted on arrival and
/// none is ever delivered.
struct OutboundBlackHole;

#[async_trait]
impl Transfer for OutboundBlackHole {
    async fn transfer(
        &self,
        token: &Token,
        from: Endpoint,
        to: Endpoint,
        _duration: Duration,
    ) -> Result<(), TransferFault> {
        if from == Endpoint::Buffer {
            return Err(TransferFault::Interrupted {
                reason: format!("{token} dropped on the way to {to}"),
            });
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_outbound_loss_leaves_receivers_empty() {
    let exchange = exchange_over(Arc::new(OutboundBlackHole));

    exchange.start().unwrap();
    sleep(Duration::from_millis(8_500)).await;
    exchange.stop().await;
    exchange.drain().await;

    let snapshot = exchange.snapshot();
    assert!(snapshot.black_box.received > 0);
    assert_eq!(snapshot.black_box.sent, 0);
    for color in Color::ALL {
        assert_eq!(snapshot.terminal(color).received, 0);
    }
    assert!(snapshot.is_balanced());
}
