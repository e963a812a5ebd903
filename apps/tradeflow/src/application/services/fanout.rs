//! Fan-out Router
//!
//! Copies every trade from the single ingestion channel to one bounded
//! channel per sink. Delivery blocks on the slowest sink: nothing is
//! dropped and nothing is buffered beyond the channel capacities, so a
//! stalled sink backpressures every connector.

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::application::ports::{TradeReceiver, TradeSender};

/// Handle to a running fan-out task.
#[derive(Debug)]
pub struct FanOut {
    done: JoinHandle<u64>,
}

impl FanOut {
    /// Start multicasting `input` to `outputs` new channels of `capacity`.
    ///
    /// Returns the handle and one receiver per output, in order.
    #[must_use]
    pub fn spawn(input: TradeReceiver, outputs: usize, capacity: usize) -> (Self, Vec<TradeReceiver>) {
        let (senders, receivers): (Vec<TradeSender>, Vec<TradeReceiver>) =
            (0..outputs).map(|_| mpsc::channel(capacity)).unzip();

        let done = tokio::spawn(multicast(input, senders));
        (Self { done }, receivers)
    }

    /// Wait for the task to finish, which happens once the ingestion
    /// channel is closed and drained.
    ///
    /// Returns the number of trades relayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub async fn join(self) -> Result<u64, JoinError> {
        self.done.await
    }
}

async fn multicast(mut input: TradeReceiver, mut outputs: Vec<TradeSender>) -> u64 {
    let mut relayed = 0;

    while let Some(trade) = input.recv().await {
        let mut closed = Vec::new();
        for (index, output) in outputs.iter().enumerate() {
            if output.send(trade.clone()).await.is_err() {
                closed.push(index);
            }
        }

        for index in closed.into_iter().rev() {
            outputs.remove(index);
            tracing::warn!(remaining = outputs.len(), "Sink output closed, removed from fan-out");
        }

        if outputs.is_empty() {
            tracing::error!("All sink outputs closed, stopping fan-out");
            break;
        }
        relayed += 1;
    }

    tracing::debug!(relayed, "Fan-out finished");
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::{Side, Trade};
    use chrono::Utc;

    fn trade(n: u32) -> Trade {
        Trade::new("mock", Utc::now(), "BTC/USD", f64::from(n), 1.0, Side::Buyer)
    }

    #[tokio::test]
    async fn every_output_sees_every_trade_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let (fanout, mut outputs) = FanOut::spawn(rx, 3, 4);
        assert_eq!(outputs.len(), 3);

        let producer = tokio::spawn(async move {
            for n in 0..20 {
                tx.send(trade(n)).await.unwrap();
            }
        });

        let mut consumers = Vec::new();
        for mut output in outputs {
            consumers.push(tokio::spawn(async move {
                let mut prices = Vec::new();
                while let Some(trade) = output.recv().await {
                    prices.push(trade.price());
                }
                prices
            }));
        }

        producer.await.unwrap();
        assert_eq!(fanout.join().await.unwrap(), 20);

        let expected: Vec<f64> = (0..20).map(f64::from).collect();
        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn closed_output_is_removed() {
        let (tx, rx) = mpsc::channel(4);
        let (fanout, mut outputs) = FanOut::spawn(rx, 2, 4);
        let mut survivor = outputs.pop().unwrap();
        drop(outputs);

        tx.send(trade(1)).await.unwrap();
        tx.send(trade(2)).await.unwrap();
        drop(tx);

        assert_eq!(survivor.recv().await.unwrap().price(), 1.0);
        assert_eq!(survivor.recv().await.unwrap().price(), 2.0);
        assert!(survivor.recv().await.is_none());
        assert_eq!(fanout.join().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ends_when_input_closes() {
        let (tx, rx) = mpsc::channel::<Trade>(1);
        let (fanout, mut outputs) = FanOut::spawn(rx, 2, 1);
        drop(tx);

        assert_eq!(fanout.join().await.unwrap(), 0);
        for output in &mut outputs {
            assert!(output.recv().await.is_none());
        }
    }
}
