//! Common imports used across the crate.

pub use std::collections::{HashMap, HashSet, VecDeque};
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};

pub use fxhash::{FxHashMap, FxHashSet};

pub use crate::{MapError, Result};
