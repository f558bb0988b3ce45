use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::{
    db_types::OrderStatus,
    events::{
        EventHandler,
        EventProducer,
        Handler,
        OrderAssignedEvent,
        OrderDeliveredEvent,
        OrderStatusChangedEvent,
        PaymentConfirmedEvent,
        RevisionRequestedEvent,
    },
    traits::{AppliedTransition, TransitionOutcome},
};

type BoxedHook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub order_assigned_producer: Vec<EventProducer<OrderAssignedEvent>>,
    pub order_delivered_producer: Vec<EventProducer<OrderDeliveredEvent>>,
    pub payment_confirmed_producer: Vec<EventProducer<PaymentConfirmedEvent>>,
    pub revision_requested_producer: Vec<EventProducer<RevisionRequestedEvent>>,
}

impl EventProducers {
    /// Notifies subscribers of every step in a committed transition. Call this only once the unit of work has been
    /// committed. Delivery is best-effort and never fails the caller.
    pub fn publish_transitions(&self, outcome: &TransitionOutcome) {
        for step in &outcome.steps {
            self.publish_step(step);
        }
    }

    fn publish_step(&self, step: &AppliedTransition) {
        let order = &step.order;
        trace!("📬️ Publishing events for order {} ({} -> {})", order.id, step.from, step.to);
        for emitter in &self.status_changed_producer {
            let event = OrderStatusChangedEvent::new(order.clone(), step.from, step.to, step.actor);
            emitter.publish_event(event);
        }
        match step.to {
            OrderStatus::Assigned => {
                if let (Some(writer), Some(manager)) = (order.writer.user_id(), order.manager.user_id()) {
                    for emitter in &self.order_assigned_producer {
                        emitter.publish_event(OrderAssignedEvent {
                            order: order.clone(),
                            writer,
                            manager,
                            writer_amount: order.writer_amount,
                            assignment_fee: order.manager_assign_fee,
                        });
                    }
                }
            },
            OrderStatus::Delivered => {
                for emitter in &self.order_delivered_producer {
                    emitter.publish_event(OrderDeliveredEvent {
                        order: order.clone(),
                        client: order.client_id,
                        manager: order.manager.user_id(),
                        submission_fee: order.manager_submit_fee,
                    });
                }
            },
            OrderStatus::Paid => {
                for emitter in &self.payment_confirmed_producer {
                    emitter.publish_event(PaymentConfirmedEvent {
                        order: order.clone(),
                        writer: order.writer.user_id(),
                        manager: order.manager.user_id(),
                        writer_amount: order.writer_amount,
                        manager_amount: order.manager_amount(),
                        platform_margin: order.platform_margin,
                        external_reference: order.external_reference.clone(),
                    });
                }
            },
            OrderStatus::RevisionPending => {
                for emitter in &self.revision_requested_producer {
                    emitter.publish_event(RevisionRequestedEvent {
                        order: order.clone(),
                        writer: order.writer.user_id(),
                        clawback: step.clawback.clone(),
                    });
                }
            },
            _ => {},
        }
    }
}

pub struct EventHandlers {
    pub on_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_order_assigned: Option<EventHandler<OrderAssignedEvent>>,
    pub on_order_delivered: Option<EventHandler<OrderDeliveredEvent>>,
    pub on_payment_confirmed: Option<EventHandler<PaymentConfirmedEvent>>,
    pub on_revision_requested: Option<EventHandler<RevisionRequestedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_status_changed: hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f)),
            on_order_assigned: hooks.on_order_assigned.map(|f| EventHandler::new(buffer_size, f)),
            on_order_delivered: hooks.on_order_delivered.map(|f| EventHandler::new(buffer_size, f)),
            on_payment_confirmed: hooks.on_payment_confirmed.map(|f| EventHandler::new(buffer_size, f)),
            on_revision_requested: hooks.on_revision_requested.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_assigned {
            result.order_assigned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_delivered {
            result.order_delivered_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_confirmed {
            result.payment_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_revision_requested {
            result.revision_requested_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_assigned {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_order_delivered {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_confirmed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_revision_requested {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_order_assigned: Option<Handler<OrderAssignedEvent>>,
    pub on_order_delivered: Option<Handler<OrderDeliveredEvent>>,
    pub on_payment_confirmed: Option<Handler<PaymentConfirmedEvent>>,
    pub on_revision_requested: Option<Handler<RevisionRequestedEvent>>,
}

impl EventHooks {
    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_order_assigned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAssignedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_order_assigned = Some(Arc::new(f));
        self
    }

    pub fn on_order_delivered<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderDeliveredEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_order_delivered = Some(Arc::new(f));
        self
    }

    pub fn on_payment_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentConfirmedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_payment_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_revision_requested<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RevisionRequestedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_revision_requested = Some(Arc::new(f));
        self
    }
}
