//! Operator HTTP surface: health, worker status, on-demand polling and valuation.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
