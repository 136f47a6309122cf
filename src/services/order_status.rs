use std::collections::HashMap;

use lazy_static::lazy_static;
use tracing::debug;

use crate::models::order::{ApprovalStatus, LineItem, LineItemStatus, Order, OrderStatus};

lazy_static! {
    /// Monotonic rank of each order status. An aggregated candidate is only
    /// applied when its rank strictly exceeds the current one, so concurrent
    /// per-item updates can never walk an order's status backwards.
    ///
    /// Rank 0 marks the terminal sentinels (and the provisional
    /// payment-initiated state); sentinels bypass the lock entirely.
    static ref STATUS_RANK: HashMap<OrderStatus, u8> = {
        let mut m = HashMap::new();
        m.insert(OrderStatus::PaymentInitiated, 0);
        m.insert(OrderStatus::Pending, 1);
        m.insert(OrderStatus::PartialPending, 2);
        m.insert(OrderStatus::ShipmentPreparation, 3);
        m.insert(OrderStatus::PartialShipmentPreparation, 4);
        m.insert(OrderStatus::Shipped, 5);
        m.insert(OrderStatus::PartialShipped, 6);
        m.insert(OrderStatus::Delivered, 7);
        m.insert(OrderStatus::PartialDelivered, 8);
        m.insert(OrderStatus::Returned, 9);
        m.insert(OrderStatus::PartialReturned, 10);
        m.insert(OrderStatus::Refunded, 11);
        m.insert(OrderStatus::PartialRefunded, 12);
        m.insert(OrderStatus::Cancelled, 0);
        m.insert(OrderStatus::PartialCancelled, 0);
        m.insert(OrderStatus::Rejected, 0);
        m.insert(OrderStatus::Failed, 0);
        m
    };
}

pub fn status_rank(status: OrderStatus) -> u8 {
    *STATUS_RANK.get(&status).unwrap_or(&0)
}

/// Terminal sentinels carry rank 0 yet must always be applied: an order that
/// ends up cancelled, rejected or failed reports that no matter what rank it
/// had reached.
pub fn is_terminal_sentinel(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Cancelled
            | OrderStatus::PartialCancelled
            | OrderStatus::Rejected
            | OrderStatus::Failed
    )
}

/// The rank lock: a candidate replaces the current status only when it is a
/// terminal sentinel or strictly outranks the current status. A sentinel is
/// itself left only via a strictly higher rank, which in practice means the
/// return path (ranks 9 through 12).
pub fn rank_lock_allows(current: OrderStatus, candidate: OrderStatus) -> bool {
    is_terminal_sentinel(candidate) || status_rank(candidate) > status_rank(current)
}

/// Phase-1 reducer: derives an order-status candidate from the approval
/// decisions across all line items.
///
/// Precedence: every item rejected wins over the all-decided case, so a fully
/// rejected order reports `rejected` rather than `pending`.
pub fn approval_candidate(items: &[LineItem]) -> Option<OrderStatus> {
    let total = items.len();
    if total == 0 {
        return None;
    }

    let approved = items
        .iter()
        .filter(|i| i.approval == ApprovalStatus::Approved)
        .count();
    let rejected = items
        .iter()
        .filter(|i| i.approval == ApprovalStatus::Rejected)
        .count();
    let undecided = total - approved - rejected;

    if undecided == 0 {
        if rejected == total {
            return Some(OrderStatus::Rejected);
        }
        if approved >= 1 {
            return Some(OrderStatus::Pending);
        }
        return None;
    }

    if approved >= 1 || rejected >= 1 {
        return Some(OrderStatus::PartialPending);
    }

    None
}

/// Fulfillment states that feed a phase-2 bucket, most terminal first. Items
/// mid-flight in the return sub-machine (return-requested, refund-approved,
/// refund-rejected, refund-in-progress) and still-pending items count toward
/// no bucket.
const FULFILLMENT_BUCKETS: [(LineItemStatus, OrderStatus, OrderStatus); 6] = [
    (LineItemStatus::Refunded, OrderStatus::Refunded, OrderStatus::PartialRefunded),
    (LineItemStatus::Returned, OrderStatus::Returned, OrderStatus::PartialReturned),
    (LineItemStatus::Cancelled, OrderStatus::Cancelled, OrderStatus::PartialCancelled),
    (LineItemStatus::Delivered, OrderStatus::Delivered, OrderStatus::PartialDelivered),
    (LineItemStatus::Shipped, OrderStatus::Shipped, OrderStatus::PartialShipped),
    (
        LineItemStatus::ShipmentPreparation,
        OrderStatus::ShipmentPreparation,
        OrderStatus::PartialShipmentPreparation,
    ),
];

/// Phase-2 reducer: derives an order-status candidate from the fulfillment
/// states of the approved line items only.
///
/// A full bucket (every approved item in the state) beats any partial bucket;
/// among partials the most terminal state wins.
pub fn fulfillment_candidate(items: &[LineItem]) -> Option<OrderStatus> {
    let approved: Vec<&LineItem> = items.iter().filter(|i| i.is_approved()).collect();
    if approved.is_empty() {
        return None;
    }

    let count = |state: LineItemStatus| approved.iter().filter(|i| i.status == state).count();

    for (state, full, _) in FULFILLMENT_BUCKETS {
        if count(state) == approved.len() {
            return Some(full);
        }
    }

    for (state, _, partial) in FULFILLMENT_BUCKETS {
        if count(state) >= 1 {
            return Some(partial);
        }
    }

    None
}

/// Applies a candidate through the rank lock, returning the new status when
/// it actually changed.
pub fn apply_candidate(order: &mut Order, candidate: OrderStatus) -> Option<OrderStatus> {
    if candidate == order.status || !rank_lock_allows(order.status, candidate) {
        return None;
    }
    debug!(
        order_id = %order.id,
        from = %order.status,
        to = %candidate,
        "order status advanced"
    );
    order.status = candidate;
    Some(candidate)
}

/// Recomputes the order status after an approval decision.
pub fn refresh_after_approval(order: &mut Order) -> Option<OrderStatus> {
    approval_candidate(&order.line_items).and_then(|c| apply_candidate(order, c))
}

/// Recomputes the order status after a fulfillment or return-machine change.
pub fn refresh_after_fulfillment(order: &mut Order) -> Option<OrderStatus> {
    fulfillment_candidate(&order.line_items).and_then(|c| apply_candidate(order, c))
}
