#[cfg(test)]
mod roaming_tests;
