use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use reimburse_core::config::LoadOptions;
use reimburse_core::{ExpenseDraft, Role};

use crate::commands::{settle, sign_in, CommandContext, CommandResult};

const COMMAND: &str = "submit";

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long = "as", value_name = "EMAIL", help = "Requester email to sign in with")]
    pub requester: String,
    #[arg(long, help = "Amount to reimburse, at most two decimal places")]
    pub amount: Decimal,
    #[arg(long, default_value = "", help = "Amount spelled out in words")]
    pub amount_in_words: String,
    #[arg(long = "beneficiary", value_name = "NAME")]
    pub beneficiary_name: String,
    #[arg(long = "bank", value_name = "BANK", default_value = "")]
    pub beneficiary_bank: String,
    #[arg(long = "account", value_name = "ACCOUNT_NO")]
    pub beneficiary_account: String,
    #[arg(long, default_value = "")]
    pub reason: String,
    #[arg(long, value_name = "LINK", help = "Receipt reference; omitted means `No File`")]
    pub receipt: Option<String>,
    #[arg(long, value_name = "NAME", help = "Approver display name or first name")]
    pub approver: String,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Request date; defaults to today")]
    pub date: Option<NaiveDate>,
}

impl From<SubmitArgs> for ExpenseDraft {
    fn from(args: SubmitArgs) -> Self {
        Self {
            request_date: args.date,
            amount: args.amount,
            amount_in_words: args.amount_in_words,
            beneficiary_name: args.beneficiary_name,
            beneficiary_bank: args.beneficiary_bank,
            beneficiary_account: args.beneficiary_account,
            reason: args.reason,
            receipt: args.receipt,
            approver_name: args.approver,
        }
    }
}

pub fn run(options: &LoadOptions, args: SubmitArgs) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };

    settle(context.block_on(async {
        let mut portal = context.portal().await?;
        sign_in(COMMAND, &mut portal, Role::Requester, &args.requester)?;

        let requester = args.requester.clone();
        let outcome = portal.submit_request(args.into()).await;
        let result = match outcome {
            Ok(stored) => CommandResult::success_with(
                COMMAND,
                format!("request recorded at row {} for {}", stored.row, requester.trim()),
                Some(stored),
            ),
            Err(error) => CommandResult::rejected(COMMAND, error, &portal),
        };
        portal.logout();
        Ok(result)
    }))
}
