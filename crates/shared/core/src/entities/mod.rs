mod order;
mod order_status;
mod order_type;
mod side;

pub use order::{Order, OrderId, OrderSpec};
pub use order_status::OrderStatus;
pub use order_type::OrderKind;
pub use side::Side;
