pub mod memo;
pub mod receipts;
