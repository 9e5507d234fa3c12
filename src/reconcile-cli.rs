//! A simple CLI tool for reconciling an election's vote store against its
//! ledger audit log. This uses the server's own reconciliation, and is by
//! definition compatible with the output of our dump endpoint.

use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use chainvote_backend::{
    model::api::dump::LedgerDump,
    vote::reconcile::{reconcile, ReconciliationReport},
};

const PROGRAM_NAME: &str = "reconcile-cli";

const ABOUT_TEXT: &str = "Check that every recorded vote is anchored and audited, \
and that every anchored vote was recorded.

EXIT CODES:
     0: The election is consistent.
   255: Ran successfully, but inconsistencies were found.
 Other: Error.";

const DUMP_PATH: &str = "DUMP_PATH";

const DUMP_PATH_HELP: &str = "The path to a JSON dump of a specific election,\n\
as returned by `GET /elections/<election_id>/dump`";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(DUMP_PATH)
            .help(DUMP_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
}

fn load(path: &str) -> Result<ReconciliationReport, Error> {
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: LedgerDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;
    Ok(reconcile(&dump))
}

fn plural(n: usize) -> &'static str {
    if n != 1 {
        "s"
    } else {
        ""
    }
}

/// Print the findings of a report, one per line.
fn describe(report: &ReconciliationReport) {
    for vote in &report.unanchored_votes {
        println!(
            "Vote {} by voter {} has no ledger reference.",
            vote.vote_hash, vote.voter_id
        );
    }
    for vote in &report.unaudited_votes {
        println!(
            "Vote {} by voter {} has no committed audit entry.",
            vote.vote_hash, vote.voter_id
        );
    }
    for entry in &report.orphaned_anchors {
        println!(
            "Attempt {} anchored {} in {} but no vote carries it.",
            entry.attempt_id,
            entry.vote_hash,
            entry.tx_hash.as_deref().unwrap_or("an unknown transaction")
        );
    }
    for reservation in &report.unresolved_reservations {
        println!(
            "Reservation {} for voter {} is still {:?}.",
            reservation.token, reservation.voter_id, reservation.state
        );
    }
    let unconfirmed = report.unconfirmed_submissions.len();
    if unconfirmed > 0 {
        println!(
            "Note: {unconfirmed} submission{} timed out before confirming and may have landed later.",
            plural(unconfirmed)
        );
    }
}

/// Run reconciliation, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(DUMP_PATH).unwrap(); // Required argument is guaranteed to be present.
    match load(path) {
        Ok(report) => {
            let checked = report.votes_checked;
            describe(&report);
            if report.is_consistent() {
                println!(
                    "Election {} is consistent ({checked} vote{} checked).",
                    report.election_id,
                    plural(checked)
                );
                0
            } else {
                println!(
                    "Election {} needs reconciliation ({checked} vote{} checked).",
                    report.election_id,
                    plural(checked)
                );
                255
            }
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation() {
        log4rs_test_utils::test_logging::init_logging_once_for(
            ["chainvote_backend", "reconcile_cli"],
            None,
            None,
        );

        let report = load("example_dumps/consistent.json").unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.votes_checked, 2);
        assert_eq!(report.unconfirmed_submissions.len(), 1);

        let report = load("example_dumps/orphaned.json").unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.orphaned_anchors.len(), 1);
        assert_eq!(report.orphaned_anchors[0].voter_id, 5);
        assert_eq!(report.unresolved_reservations.len(), 1);
        assert!(report.unaudited_votes.is_empty());

        assert!(matches!(
            load("example_dumps/malformed.json"),
            Err(Error::Format(_))
        ));
        assert!(matches!(load("not a real file"), Err(Error::IO(_))));
    }

    #[test]
    fn correct_cli_usage() {
        let command_line = [PROGRAM_NAME, "example_dumps/consistent.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let command_line = [PROGRAM_NAME, "example_dumps/orphaned.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let command_line = [PROGRAM_NAME, "example_dumps/malformed.json"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [PROGRAM_NAME, "not a real file"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);
    }

    #[test]
    fn bad_cli_usage() {
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
