mod helpers;
mod recovery_tests;
mod stats_tests;
