mod evaluator;

pub use evaluator::{
    is_calendar_eligible, is_due, item_is_due, next_due_at, next_eligible_date, next_item_due_at,
};
