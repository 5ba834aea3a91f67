use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CartLineAddedEvent,
    DeliveryRequestedEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderConfirmedEvent,
    SessionCreatedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_confirmed_producer: Vec<EventProducer<OrderConfirmedEvent>>,
    pub cart_line_added_producer: Vec<EventProducer<CartLineAddedEvent>>,
    pub session_created_producer: Vec<EventProducer<SessionCreatedEvent>>,
    pub delivery_requested_producer: Vec<EventProducer<DeliveryRequestedEvent>>,
}

pub struct EventHandlers {
    pub on_order_confirmed: Option<EventHandler<OrderConfirmedEvent>>,
    pub on_cart_line_added: Option<EventHandler<CartLineAddedEvent>>,
    pub on_session_created: Option<EventHandler<SessionCreatedEvent>>,
    pub on_delivery_requested: Option<EventHandler<DeliveryRequestedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_confirmed = hooks.on_order_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_cart_line_added = hooks.on_cart_line_added.map(|f| EventHandler::new(buffer_size, f));
        let on_session_created = hooks.on_session_created.map(|f| EventHandler::new(buffer_size, f));
        let on_delivery_requested = hooks.on_delivery_requested.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_confirmed, on_cart_line_added, on_session_created, on_delivery_requested }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_confirmed {
            result.order_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_cart_line_added {
            result.cart_line_added_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_session_created {
            result.session_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_delivery_requested {
            result.delivery_requested_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_confirmed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_cart_line_added {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_session_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_delivery_requested {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_confirmed: Option<Handler<OrderConfirmedEvent>>,
    pub on_cart_line_added: Option<Handler<CartLineAddedEvent>>,
    pub on_session_created: Option<Handler<SessionCreatedEvent>>,
    pub on_delivery_requested: Option<Handler<DeliveryRequestedEvent>>,
}

impl EventHooks {
    pub fn on_order_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_cart_line_added<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CartLineAddedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_cart_line_added = Some(Arc::new(f));
        self
    }

    pub fn on_session_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(SessionCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_session_created = Some(Arc::new(f));
        self
    }

    pub fn on_delivery_requested<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DeliveryRequestedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_delivery_requested = Some(Arc::new(f));
        self
    }
}
