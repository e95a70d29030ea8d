//! Intent journal.
//!
//! Every order is recorded before it is sent and completed with its outcome
//! afterwards, giving an audit trail of fills and missed signals. Client
//! order ids are unique, so the same intent can never be submitted twice.
//!
//! # Flow
//!
//! 1. Record intent (before submission)
//! 2. Submit to the exchange
//! 3. Complete intent (with the fill or failure)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use breakout_domain::Symbol;

use crate::error::{ExecError, ExecResult};
use crate::ports::{FillResult, OrderIntent};

// =============================================================================
// Intent Types
// =============================================================================

/// A recorded order and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Same as the order's client order id
    pub id: Uuid,
    pub order: OrderIntent,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<IntentResult>,
}

impl Intent {
    /// Create a new pending intent.
    pub fn new(order: OrderIntent) -> Self {
        Self {
            id: order.client_order_id,
            order,
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, IntentStatus::Pending)
    }

    /// Completed with something actually filled.
    pub fn is_success(&self) -> bool {
        matches!(self.status, IntentStatus::Completed)
            && matches!(&self.result, Some(IntentResult::Filled(fill)) if fill.as_fill().is_some())
    }
}

/// Status of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    /// Recorded, outcome not known yet
    Pending,
    /// Outcome recorded
    Completed,
}

/// Outcome of an intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntentResult {
    /// Exchange answered (possibly with `success == false`)
    Filled(FillResult),
    /// Exchange could not be reached
    Failed(String),
}

// =============================================================================
// Intent Journal
// =============================================================================

/// Completed intents kept in the journal; older ones are pruned.
pub const DEFAULT_RETAINED_COMPLETED: usize = 10_000;

#[derive(Default)]
struct JournalState {
    intents: HashMap<Uuid, Intent>,
    /// Completed intent ids, oldest completion first
    completed: VecDeque<Uuid>,
}

/// In-memory journal of submitted orders.
///
/// Pending intents are always kept; only the most recent completed ones are.
pub struct IntentJournal {
    retained_completed: usize,
    state: RwLock<JournalState>,
}

impl IntentJournal {
    /// Create a new intent journal.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED_COMPLETED)
    }

    /// Create a journal keeping at most `retained_completed` completed intents.
    pub fn with_retention(retained_completed: usize) -> Self {
        Self {
            retained_completed,
            state: RwLock::new(JournalState::default()),
        }
    }

    fn read(&self) -> ExecResult<RwLockReadGuard<'_, JournalState>> {
        self.state.read().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire read lock: {}", e))
        })
    }

    fn write(&self) -> ExecResult<RwLockWriteGuard<'_, JournalState>> {
        self.state.write().map_err(|e| {
            ExecError::IntentJournal(format!("Failed to acquire write lock: {}", e))
        })
    }

    /// Record a new intent before submission.
    ///
    /// Returns error if intent with same ID already exists.
    pub fn record(&self, intent: Intent) -> ExecResult<()> {
        let mut state = self.write()?;

        if state.intents.contains_key(&intent.id) {
            return Err(ExecError::AlreadyProcessed(intent.id));
        }

        state.intents.insert(intent.id, intent);
        Ok(())
    }

    pub fn get(&self, intent_id: Uuid) -> ExecResult<Option<Intent>> {
        Ok(self.read()?.intents.get(&intent_id).cloned())
    }

    /// Complete an intent with its outcome, pruning the oldest completed
    /// intents beyond the retention limit.
    pub fn complete(&self, intent_id: Uuid, result: IntentResult) -> ExecResult<()> {
        let mut state = self.write()?;

        let intent = state.intents.get_mut(&intent_id).ok_or_else(|| {
            ExecError::IntentJournal(format!("Intent not found: {}", intent_id))
        })?;

        if !intent.is_pending() {
            return Err(ExecError::AlreadyProcessed(intent_id));
        }

        intent.status = IntentStatus::Completed;
        intent.completed_at = Some(Utc::now());
        intent.result = Some(result);

        state.completed.push_back(intent_id);
        while state.completed.len() > self.retained_completed {
            let Some(pruned) = state.completed.pop_front() else {
                break;
            };
            state.intents.remove(&pruned);
        }

        Ok(())
    }

    /// Intents still waiting for an outcome.
    pub fn get_pending(&self) -> ExecResult<Vec<Intent>> {
        Ok(self.read()?.intents.values().filter(|i| i.is_pending()).cloned().collect())
    }

    /// Intents for a symbol, oldest first.
    pub fn get_by_symbol(&self, symbol: &Symbol) -> ExecResult<Vec<Intent>> {
        let state = self.read()?;

        let mut matching: Vec<Intent> =
            state.intents.values().filter(|i| &i.order.symbol == symbol).cloned().collect();
        matching.sort_by_key(|i| (i.created_at, i.id));
        Ok(matching)
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.intents.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IntentJournal {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
