pub mod customer;
pub mod guest;
pub mod order;
pub mod order_item;
pub mod payment_instrument;
pub mod product;
