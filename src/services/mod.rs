pub mod approvals;
pub mod cart;
pub mod fulfillment;
pub mod order_status;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod returns;
