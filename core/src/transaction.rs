//! Transaction fact records — immutable once appended.

use crate::types::Money;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Operation results and types the fraud rules key on.
pub const RESULT_SUCCESS: &str = "SUCCESS";
pub const RESULT_REJECT: &str = "REJECT";
pub const TYPE_DEPOSIT: &str = "DEPOSIT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFact {
    pub trans_id: String,
    pub trans_date: NaiveDateTime,
    pub card_num: String,
    pub oper_type: String,
    pub amount: Money,
    pub oper_result: String,
    pub terminal: String,
}
