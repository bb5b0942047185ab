mod common;
mod extras_tests;
mod startup_tests;
