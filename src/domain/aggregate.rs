// ============================================================================
// Aggregate Root Pattern - Decide / Apply
// ============================================================================
//
// Key Principles:
// 1. Commands are validated against current state before anything changes
// 2. Validation yields events describing what happened
// 3. Applying events is the only way state moves
// 4. Both steps are pure; persistence and side effects live in the service
//
// ============================================================================

/// Generic Aggregate trait - every aggregate in the domain implements this
///
/// Type Parameters:
/// - `Event`: What the aggregate reports after a successful decision
/// - `Command`: Requested change
/// - `Error`: Business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Decide which events a command produces (business logic, no mutation)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Apply an event to move state forward
    fn apply_event(&mut self, event: &Self::Event);

    /// Decide and apply in one step, returning the updated aggregate and the
    /// events that produced it. `self` is left untouched.
    fn execute(&self, command: &Self::Command) -> Result<(Self, Vec<Self::Event>), Self::Error>
    where
        Self: Clone,
    {
        let events = self.handle_command(command)?;
        let mut next = self.clone();
        for event in &events {
            next.apply_event(event);
        }
        Ok((next, events))
    }
}
