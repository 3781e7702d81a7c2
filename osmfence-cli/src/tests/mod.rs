//! Shared test harness modules for the osmfence CLI.

use super::*;

mod helpers;
