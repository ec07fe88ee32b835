use ordesk_core::domain::order::{Order, OrderStatus};

/// Outcome of screening one `delete_order` attempt. Every variant except
/// `Allow` is a structured refusal the model relays to the user; only
/// `Allow` may be followed by a mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteDecision {
    MissingOrderId,
    PendingConfirmation,
    MissingReason,
    NotFound,
    AlreadyDeleted,
    Blocked { status: OrderStatus },
    NotDeletable { status: OrderStatus },
    Allow,
}

/// The deletion confirmation protocol, evaluated from scratch on every
/// call. Nothing is persisted for a pending confirmation, so repeated
/// unconfirmed calls are safe no-ops.
///
/// This runs inside the tool regardless of what instructions the model was
/// given: a prompt-injected or confused model cannot skip the gate.
pub struct DeleteGuardrail;

impl DeleteGuardrail {
    pub fn evaluate(
        order_id: &str,
        confirm: bool,
        reason: Option<&str>,
        order: Option<&Order>,
    ) -> DeleteDecision {
        if order_id.trim().is_empty() {
            return DeleteDecision::MissingOrderId;
        }
        if !confirm {
            return DeleteDecision::PendingConfirmation;
        }
        if reason.map(str::trim).unwrap_or("").is_empty() {
            return DeleteDecision::MissingReason;
        }

        match order {
            None => DeleteDecision::NotFound,
            Some(order) if order.status == OrderStatus::Deleted => DeleteDecision::AlreadyDeleted,
            Some(order)
                if matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered) =>
            {
                DeleteDecision::Blocked { status: order.status }
            }
            // Unreachable with the current enum, but the deletable set is
            // policy and the status set is data; check it anyway.
            Some(order) if !order.status.deletable() => {
                DeleteDecision::NotDeletable { status: order.status }
            }
            Some(_) => DeleteDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use ordesk_core::domain::order::{Order, OrderId, OrderStatus};

    use super::{DeleteDecision, DeleteGuardrail};

    fn order(status: OrderStatus) -> Order {
        Order::new(OrderId("O-1".to_string()), "acme", status)
    }

    #[test]
    fn blank_order_id_is_rejected_first() {
        let decision = DeleteGuardrail::evaluate("  ", true, Some("dup"), None);
        assert_eq!(decision, DeleteDecision::MissingOrderId);
    }

    #[test]
    fn unconfirmed_calls_gate_on_confirmation() {
        let existing = order(OrderStatus::New);
        let decision = DeleteGuardrail::evaluate("O-1", false, Some("dup"), Some(&existing));
        assert_eq!(decision, DeleteDecision::PendingConfirmation);
    }

    #[test]
    fn confirmed_calls_without_a_reason_are_rejected() {
        let existing = order(OrderStatus::New);
        for reason in [None, Some(""), Some("   ")] {
            let decision = DeleteGuardrail::evaluate("O-1", true, reason, Some(&existing));
            assert_eq!(decision, DeleteDecision::MissingReason);
        }
    }

    #[test]
    fn unknown_orders_are_reported_not_found() {
        let decision = DeleteGuardrail::evaluate("O-404", true, Some("dup"), None);
        assert_eq!(decision, DeleteDecision::NotFound);
    }

    #[test]
    fn already_deleted_orders_short_circuit_idempotently() {
        let existing = order(OrderStatus::Deleted);
        let decision = DeleteGuardrail::evaluate("O-1", true, Some("dup"), Some(&existing));
        assert_eq!(decision, DeleteDecision::AlreadyDeleted);
    }

    #[test]
    fn shipped_and_delivered_are_blocked_unconditionally() {
        for status in [OrderStatus::Shipped, OrderStatus::Delivered] {
            let existing = order(status);
            let decision = DeleteGuardrail::evaluate("O-1", true, Some("dup"), Some(&existing));
            assert_eq!(decision, DeleteDecision::Blocked { status });
        }
    }

    #[test]
    fn deletable_statuses_are_allowed() {
        for status in [
            OrderStatus::New,
            OrderStatus::Processing,
            OrderStatus::Cancelled,
            OrderStatus::Backordered,
        ] {
            let existing = order(status);
            let decision = DeleteGuardrail::evaluate("O-1", true, Some("dup"), Some(&existing));
            assert_eq!(decision, DeleteDecision::Allow);
        }
    }
}
