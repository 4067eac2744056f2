/// Fire-and-forget audit stream of roster transitions
pub mod audit;

/// Daily operations view and check-in scheduling
pub mod daily_view;

/// Overtime shift ledger
pub mod overtime;

/// Pay classification and monthly pay summaries
pub mod payroll;

/// Service roles, installations, guards and operational posts
pub mod registry;

/// Roster store: monthly generation, reads and versioned writes
pub mod roster;

/// Reference-data seeding from the staffing configuration
pub mod seed;

/// Transition engine, the only write path for roster rows
pub mod transition;

/// Vacancy resolver
pub mod vacancy;
