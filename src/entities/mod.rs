//! sea-orm entities for the purchasing document chain.
//!
//! Cumulative counters on purchase order and goods receipt lines are only
//! ever mutated by the posting flows in `services`, under row-level locks.

pub mod audit_logs;
pub mod goods_receipt_lines;
pub mod goods_receipts;
pub mod purchase_invoice_lines;
pub mod purchase_invoices;
pub mod purchase_order_lines;
pub mod purchase_orders;
pub mod purchase_return_lines;
pub mod purchase_returns;
