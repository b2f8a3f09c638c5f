use serde::Serialize;

use reimburse_core::config::LoadOptions;
use reimburse_core::Directory;

use crate::commands::{CommandContext, CommandResult, EXIT_CONFIG};

const COMMAND: &str = "directory";

#[derive(Debug, Serialize)]
struct RequesterListing<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct ApproverListing<'a> {
    login: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct DirectoryListing<'a> {
    requesters: Vec<RequesterListing<'a>>,
    approvers: Vec<ApproverListing<'a>>,
}

/// Lists who can sign in and with which credential. Does not touch the store.
pub fn run(options: &LoadOptions) -> CommandResult {
    let context = match CommandContext::load(COMMAND, options) {
        Ok(context) => context,
        Err(failure) => return failure,
    };

    let directory = match Directory::from_config(&context.config.directory) {
        Ok(directory) => directory,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let listing = DirectoryListing {
        requesters: directory
            .requesters()
            .map(|(email, name)| RequesterListing { email, name })
            .collect(),
        approvers: directory.approvers().map(|(login, name)| ApproverListing { login, name }).collect(),
    };

    CommandResult::success_with(
        COMMAND,
        format!(
            "{} requester(s), {} approver(s)",
            listing.requesters.len(),
            listing.approvers.len()
        ),
        Some(listing),
    )
}
