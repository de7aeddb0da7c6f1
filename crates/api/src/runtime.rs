//! Background loops: outbox dispatchers and message consumers.

use std::sync::Arc;

use messaging::{
    Consumer, ConsumerConfig, InMemoryBroker, MessageHandler, OutboxConfig, OutboxDispatcher,
    topics,
};
use notification::{LogSender, NotificationHandler, fan_in_config};
use order::{DeliveryCreatedHandler, DeliveryStatusChangedHandler};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::state::AppState;

/// Handles to the running background loops.
pub struct Background {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    /// Starts both outbox dispatchers, the two order consumers and the
    /// notification fan-in.
    pub fn spawn(state: &AppState, config: &Config) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let broker = state.broker.clone();
        let outbox_config = OutboxConfig::default().with_poll_interval(config.outbox_poll_interval);
        let consumer = |handler: Arc<dyn MessageHandler>, consumer_config: ConsumerConfig| {
            Consumer::new(
                broker.clone(),
                handler,
                consumer_config
                    .with_max_attempts(config.consumer_max_attempts)
                    .with_poll_interval(config.consumer_poll_interval),
            )
        };

        let delivery_outbox = OutboxDispatcher::new(
            "delivery",
            state.deliveries.repository().clone(),
            broker.clone(),
            outbox_config.clone(),
        );
        let order_outbox = OutboxDispatcher::new(
            "order",
            state.orders.repository().clone(),
            broker.clone(),
            outbox_config,
        );
        let order_repository = state.orders.repository().clone();
        let consumers = [
            consumer(
                Arc::new(DeliveryCreatedHandler::new(order_repository.clone())),
                ConsumerConfig::new(topics::ORDER_SERVICE_GROUP, [topics::DELIVERY_CREATED]),
            ),
            consumer(
                Arc::new(DeliveryStatusChangedHandler::new(order_repository)),
                ConsumerConfig::new(topics::ORDER_SERVICE_GROUP, [topics::DELIVERY_STATUS_CHANGED]),
            ),
            consumer(Arc::new(NotificationHandler::new(LogSender)), fan_in_config()),
        ];

        let mut tasks = Vec::new();
        tasks.push(spawn_dispatcher(delivery_outbox, rx.clone()));
        tasks.push(spawn_dispatcher(order_outbox, rx.clone()));
        for consumer in consumers {
            let rx = rx.clone();
            tasks.push(tokio::spawn(async move { consumer.run(rx).await }));
        }

        tracing::info!(tasks = tasks.len(), "background loops started");
        Self { shutdown, tasks }
    }

    /// Signals every loop to stop and waits for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "background task failed");
            }
        }
        tracing::info!("background loops stopped");
    }
}

fn spawn_dispatcher<O>(
    dispatcher: OutboxDispatcher<O, InMemoryBroker>,
    rx: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    O: messaging::OutboxStore + 'static,
{
    tokio::spawn(async move { dispatcher.run(rx).await })
}
