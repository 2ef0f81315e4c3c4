use crate::commands::{with_session, CommandResult};

pub fn run() -> CommandResult {
    with_session("migrate", |_session| async {
        CommandResult::success("migrate", "applied pending migrations")
    })
}
