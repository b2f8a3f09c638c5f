use clap::Args;

use reimburse_core::config::LoadOptions;
use reimburse_core::{Decision, Role, RowId};

use crate::commands::{settle, sign_in, CommandContext, CommandResult};

const COMMAND: &str = "resolve";

#[derive(Debug, Clone, Args)]
pub struct ResolveArgs {
    #[arg(long = "as", value_name = "FIRST_NAME", help = "Approver first name to sign in with")]
    pub approver: String,
    #[arg(long, help = "Row number as reported by `assigned`")]
    pub row: usize,
    #[arg(long, value_name = "approve|decline")]
    pub decision: Decision,
    #[arg(long, default_value = "", help = "Comment recorded with the decision")]
    pub comment: String,
}

pub fn run(options: &LoadOptions, args: ResolveArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };

    settle(context.block_on(async {
        let mut portal = context.portal().await?;
        sign_in(COMMAND, &mut portal, Role::Approver, &args.approver)?;

        let result = match portal.resolve(RowId(args.row), args.decision, &args.comment).await {
            Ok(stored) => CommandResult::success_with(
                COMMAND,
                format!("row {} is now {}", stored.row, stored.request.status),
                Some(stored),
            ),
            Err(error) => CommandResult::rejected(COMMAND, error, &portal),
        };
        portal.logout();
        Ok(result)
    }))
}
