use super::context::{Context, publish_json};
use crate::domain::account::Balance;
use crate::domain::message::{BalanceKind, BalanceMessage, PaymentMessage, TopupMessage};
use crate::domain::ports::Pulse;
use crate::domain::tag::TagId;
use crate::error::{MessageError, Result};
use tracing::{debug, info, warn};

/// A ledger change made by an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    ToppedUp { id: TagId, balance: Balance },
    Paid { id: TagId, balance: Balance },
}

#[derive(Debug)]
pub enum RouteOutcome {
    Applied(Routed),
    /// The message was bad or referred to an unknown card. Already logged.
    Rejected(MessageError),
    /// Not a topic this controller handles.
    Ignored,
}

/// Turns inbound bus messages into ledger mutations.
///
/// Per-message problems come back as [`RouteOutcome::Rejected`]; only bus or
/// indicator faults are returned as `Err`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    pub async fn route(
        &self,
        ctx: &mut Context,
        topic: &str,
        payload: &[u8],
    ) -> Result<RouteOutcome> {
        if topic == ctx.topics.topup {
            match TopupMessage::decode(payload) {
                Ok(msg) => self.topup(ctx, msg).await,
                Err(e) => Ok(reject(topic, e)),
            }
        } else if topic == ctx.topics.pay {
            match PaymentMessage::decode(payload) {
                Ok(msg) => self.payment(ctx, msg).await,
                Err(e) => Ok(reject(topic, e)),
            }
        } else {
            debug!(topic, "ignoring message on unhandled topic");
            Ok(RouteOutcome::Ignored)
        }
    }

    async fn topup(&self, ctx: &mut Context, msg: TopupMessage) -> Result<RouteOutcome> {
        let balance = ctx.ledger.apply_topup(&msg.id, msg.amount);
        let report = BalanceMessage {
            id: msg.id.clone(),
            new_balance: balance,
            kind: BalanceKind::Topup,
            timestamp: ctx.timestamp(),
        };
        publish_json(ctx.bus.as_mut(), &ctx.topics.balance, &report).await?;
        info!(id = %msg.id, amount = msg.amount.value(), %balance, "top-up applied");
        ctx.indicator.pulse(Pulse::TOPUP).await?;
        Ok(RouteOutcome::Applied(Routed::ToppedUp {
            id: msg.id,
            balance,
        }))
    }

    async fn payment(&self, ctx: &mut Context, msg: PaymentMessage) -> Result<RouteOutcome> {
        let applied = ctx.ledger.apply_payment(&msg.id, msg.amount);
        ctx.indicator.pulse(Pulse::PAYMENT).await?;
        match applied {
            Some(balance) => {
                info!(id = %msg.id, amount = msg.amount.value(), %balance, "payment applied");
                Ok(RouteOutcome::Applied(Routed::Paid {
                    id: msg.id,
                    balance,
                }))
            }
            None => Ok(reject(&ctx.topics.pay, MessageError::UnknownAccount(msg.id))),
        }
    }
}

fn reject(topic: &str, error: MessageError) -> RouteOutcome {
    warn!(topic, %error, "discarding message");
    RouteOutcome::Rejected(error)
}
