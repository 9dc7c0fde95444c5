pub mod btree;
pub mod builder;
pub mod node;
pub mod page;
pub mod pager;
pub mod search;
