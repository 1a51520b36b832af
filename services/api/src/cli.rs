use crate::commands::{run_recompute, run_score, run_verify, RecomputeArgs, ScoreArgs, VerifyArgs};
use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lab_managers::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Lab Manager Identification",
    about = "Score lab memberships and maintain the ranked lab manager table",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Recompute lab managers for every lab or a single lab
    Recompute(RecomputeArgs),
    /// Score a role and job codes against the rule table
    Score(ScoreArgs),
    /// Record or clear a human verification on an assignment
    Verify(VerifyArgs),
    /// Run a full recompute against an in-memory store and print the result
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Recompute(args) => run_recompute(args),
        Command::Score(args) => run_score(args),
        Command::Verify(args) => run_verify(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_accepts_lab_and_overrides() {
        let cli = Cli::try_parse_from([
            "lab-managers",
            "recompute",
            "--lab",
            "chem-smith",
            "--snapshot",
            "exports",
            "--database",
            "labmgr.sqlite3",
            "--json",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Recompute(args)) => {
                assert_eq!(args.lab.as_deref(), Some("chem-smith"));
                assert_eq!(args.snapshot.as_deref(), Some(std::path::Path::new("exports")));
                assert!(args.json);
            }
            other => panic!("expected recompute, got {other:?}"),
        }
    }

    #[test]
    fn score_collects_repeated_job_codes() {
        let cli = Cli::try_parse_from([
            "lab-managers",
            "score",
            "--role",
            "Research Tech Sr",
            "--job-code",
            "102944",
            "--job-code",
            "102909",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Score(args)) => {
                assert_eq!(args.role, "Research Tech Sr");
                assert_eq!(args.job_codes, vec!["102944", "102909"]);
            }
            other => panic!("expected score, got {other:?}"),
        }
    }

    #[test]
    fn verify_requires_lab_and_manager() {
        assert!(Cli::try_parse_from(["lab-managers", "verify", "--lab", "chem-smith"]).is_err());

        let cli = Cli::try_parse_from([
            "lab-managers",
            "verify",
            "--lab",
            "chem-smith",
            "--manager",
            "mgarcia",
            "--unverify",
        ])
        .expect("arguments parse");
        match cli.command {
            Some(Command::Verify(args)) => {
                assert!(args.unverify);
                assert!(args.notes.is_none());
            }
            other => panic!("expected verify, got {other:?}"),
        }
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["lab-managers"]).expect("arguments parse");
        assert!(cli.command.is_none());
    }
}
