use reimburse_core::config::LoadOptions;
use reimburse_core::Role;

use crate::commands::{settle, sign_in, CommandContext, CommandResult};

const COMMAND: &str = "assigned";

pub fn run(options: &LoadOptions, approver: &str, pending_only: bool) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };

    settle(context.block_on(async {
        let mut portal = context.portal().await?;
        sign_in(COMMAND, &mut portal, Role::Approver, approver)?;

        let result = match portal.list_assigned().await {
            Ok(assigned) => {
                let message = format!(
                    "{} pending of {} assigned request(s)",
                    assigned.pending.len(),
                    assigned.all.len()
                );
                if pending_only {
                    CommandResult::success_with(COMMAND, message, Some(assigned.pending))
                } else {
                    CommandResult::success_with(COMMAND, message, Some(assigned))
                }
            }
            Err(error) => CommandResult::rejected(COMMAND, error, &portal),
        };
        portal.logout();
        Ok(result)
    }))
}
