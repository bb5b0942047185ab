#[cfg(test)]
mod bootstrap_tests;
#[cfg(test)]
mod settings_tests;
