#![cfg(test)]

pub mod common;
pub mod manager_tests;
pub mod provider_tests;
pub mod storage_tests;
