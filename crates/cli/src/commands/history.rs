use reimburse_core::config::LoadOptions;
use reimburse_core::Role;

use crate::commands::{settle, sign_in, CommandContext, CommandResult};

const COMMAND: &str = "history";

pub fn run(options: &LoadOptions, requester: &str) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };

    settle(context.block_on(async {
        let mut portal = context.portal().await?;
        sign_in(COMMAND, &mut portal, Role::Requester, requester)?;

        let result = match portal.list_history().await {
            Ok(history) => CommandResult::success_with(
                COMMAND,
                format!("{} request(s), most recent first", history.len()),
                Some(history),
            ),
            Err(error) => CommandResult::rejected(COMMAND, error, &portal),
        };
        portal.logout();
        Ok(result)
    }))
}
