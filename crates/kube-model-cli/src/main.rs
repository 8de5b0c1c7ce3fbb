use std::io::{self, Write as _};

use clap::{Parser, Subcommand};
use kube_model::{
    help, kinds,
    render::{self, Document},
    schema::{self, Catalog},
    scope::{Scope, ScopeOptions},
    yaml,
};
use snafu::{ResultExt, Snafu, ensure};

mod logging;

const APP_NAME: &str = "kube-model";
const LOG_ENV: &str = "KUBE_MODEL_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    Logging { source: logging::Error },

    #[snafu(display("failed to build the resource catalog"))]
    BuildCatalog { source: schema::Error },

    #[snafu(display("none of the requested types exist"))]
    NothingFound,

    #[snafu(display("failed to create the namespace objects"))]
    CreateNamespaces { source: kube_model::instance::Error },

    #[snafu(display("failed to render a namespace"))]
    RenderNamespace { source: render::Error },

    #[snafu(display("failed to write the namespace documents"))]
    WriteDocuments { source: yaml::Error },

    #[snafu(display("failed to write to stdout"))]
    WriteStdout { source: io::Error },
}

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about = "Inspect the kube-model resource catalog")]
struct Cli {
    /// Target OpenShift, which adds the `openshift-infra` namespace.
    #[arg(long, global = true, env = "KUBE_MODEL_OPENSHIFT")]
    openshift: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the fields of one or more types (case-insensitive).
    Describe {
        #[arg(required = true, value_name = "TYPE")]
        types: Vec<String>,
    },

    /// List the top-level resource kinds.
    ListObjs {
        /// Also list sub-object and abstract types.
        #[arg(long)]
        all: bool,
    },

    /// Print the namespace documents every run starts with.
    Namespaces {
        /// The namespace bound to objects created outside of any namespace.
        #[arg(long)]
        default_namespace: Option<String>,
    },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging(LOG_ENV, APP_NAME).context(LoggingSnafu)?;

    let catalog = kinds::catalog().context(BuildCatalogSnafu)?;
    let mut stdout = io::stdout().lock();
    match cli.command {
        Command::Describe { types } => describe(&catalog, &types, &mut stdout),
        Command::ListObjs { all } => {
            for line in help::list(&catalog, all) {
                writeln!(stdout, "{line}").context(WriteStdoutSnafu)?;
            }
            Ok(())
        }
        Command::Namespaces { default_namespace } => {
            let options = ScopeOptions {
                openshift: cli.openshift,
                default_namespace,
            };
            namespaces(&catalog, options, &mut stdout)
        }
    }
}

/// Prints the help of every type found. Unknown types are reported on stderr,
/// the command only fails when none was found.
fn describe(catalog: &Catalog, types: &[String], out: &mut impl io::Write) -> Result<(), Error> {
    let mut found = 0;
    for type_name in types {
        match help::describe(catalog, type_name) {
            Ok(help) => {
                write!(out, "{help}").context(WriteStdoutSnafu)?;
                found += 1;
            }
            Err(error) => eprintln!("{error}"),
        }
    }
    ensure!(found > 0, NothingFoundSnafu);
    Ok(())
}

fn namespaces(catalog: &Catalog, options: ScopeOptions, out: &mut impl io::Write) -> Result<(), Error> {
    let scope = Scope::new(catalog, options);
    let documents = scope
        .namespace_instances()
        .context(CreateNamespacesSnafu)?
        .iter()
        .filter_map(|namespace| namespace.render().transpose())
        .collect::<Result<Vec<Document>, _>>()
        .context(RenderNamespaceSnafu)?;
    yaml::serialize_all(out, &documents).context(WriteDocumentsSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn describe_fails_only_when_nothing_matched() {
        let catalog = kinds::catalog().unwrap();
        let mut out = Vec::new();

        describe(&catalog, &["secret".to_owned(), "Nope".to_owned()], &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Secret:\n"));

        assert!(matches!(
            describe(&catalog, &["Nope".to_owned()], &mut Vec::new()),
            Err(Error::NothingFound)
        ));
    }

    #[test]
    fn openshift_adds_its_infrastructure_namespace() {
        let catalog = kinds::catalog().unwrap();
        let options = ScopeOptions {
            openshift: true,
            default_namespace: Some("apps".to_owned()),
        };
        let mut out = Vec::new();
        namespaces(&catalog, options, &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("---\n").count(), 2);
        assert!(out.contains("name: apps\n"));
        assert!(out.contains("name: openshift-infra\n"));
        assert!(!out.contains("name: kube-system\n"));
    }
}
