//! Generated single-use build recipe.
//!
//! The recipe is Dockerfile syntax. Its statement order is fixed:
//! base image, identity labels, `intermediate=1`, copy of the whole context, permission
//! normalisation, user script, `intermediate=0`. Only a build whose user script succeeded
//! reaches the last statement, which is what lets the reconciler tell finished images
//! from leftovers.
use std::fmt;

use envb_model::{BuildLabels, BuildTask, Label, Sentinels};

/// Name of the exclusion file read by the backend.
pub const IGNORE_FILE: &str = ".dockerignore";

const PERMISSION_COMMANDS: [&str; 4] = [
    "chown -R :$(id -g) . > /dev/null 2>&1",
    r"find . -type d -exec chmod g+rwxs {} \; > /dev/null 2>&1",
    r"find . -type f -exec chmod g+rwx {} \; > /dev/null 2>&1",
    "chmod g+rwx . > /dev/null 2>&1",
];

const PERMISSION_HINT: &str = "The base image must have USER root or \"sudo\" must be installed, \"find\" must also be installed.";
const REMOVAL_HINT: &str = "The setup script could not be removed from the image, \"sudo\" might be missing.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    From(String),
    Label(Label),
    Copy { source: String, target: String },
    Run(String),
}

impl Statement {
    pub fn is_intermediate_label(&self) -> bool {
        matches!(self, Statement::Label(l) if l.key == envb_model::LABEL_INTERMEDIATE)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::From(image) => write!(f, "FROM {image}"),
            Statement::Label(l) => write!(f, "LABEL {}=\"{}\"", l.key, l.value),
            Statement::Copy { source, target } => write!(f, "COPY {source} \"{target}\""),
            Statement::Run(cmd) => write!(f, "RUN {cmd}"),
        }
    }
}

/// Inputs of the generator.
#[derive(Debug, Clone)]
pub struct DescriptorInput<'a> {
    pub base_image: &'a str,
    pub task: &'a BuildTask,
    /// Absolute directory the context is copied to inside the image.
    pub workdir: &'a str,
    /// File name of the setup script inside the context.
    pub script: &'a str,
    /// File name the recipe itself is written to inside the context.
    pub descriptor: &'a str,
    /// Project metadata directory, hidden from the image.
    pub metadata_dir: &'a str,
}

/// Ordered recipe plus the paths the backend must leave out of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescriptor {
    statements: Vec<Statement>,
    ignore: Vec<String>,
}

impl BuildDescriptor {
    pub fn generate(input: &DescriptorInput<'_>, sentinels: &Sentinels) -> Self {
        let labels = BuildLabels::new(
            &input.task.task_id,
            &input.task.project_id,
            &input.task.environment_id,
        );

        let mut statements = Vec::with_capacity(labels.len() + 6);
        statements.push(Statement::From(input.base_image.to_string()));
        statements.extend(labels.iter().cloned().map(Statement::Label));
        statements.push(Statement::Label(Label::intermediate(true)));
        statements.push(Statement::Copy {
            source: ".".to_string(),
            target: input.workdir.to_string(),
        });
        statements.push(Statement::Run(permission_step(input.workdir)));
        statements.push(Statement::Run(user_script_step(
            input.workdir,
            input.script,
            sentinels,
        )));
        statements.push(Statement::Label(Label::intermediate(false)));

        let ignore = vec![
            IGNORE_FILE.to_string(),
            input.metadata_dir.to_string(),
            input.descriptor.to_string(),
        ];

        Self { statements, ignore }
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn ignore_list(&self) -> &[String] {
        &self.ignore
    }

    /// Recipe text.
    pub fn render(&self) -> String {
        let mut out = self
            .statements
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        out
    }

    /// Content of the exclusion file.
    pub fn render_ignore(&self) -> String {
        self.ignore.iter().map(|p| format!("{p}\n")).collect()
    }
}

/// Normalise group ownership and permissions of the copied context.
///
/// Tries the unprivileged variant, then the `sudo` one; if both fail the hint is printed and
/// `! echo` makes the statement fail.
fn permission_step(workdir: &str) -> String {
    let plain = PERMISSION_COMMANDS.join(" && ");
    let elevated = PERMISSION_COMMANDS
        .iter()
        .map(|c| format!("sudo {c}"))
        .collect::<Vec<_>>()
        .join(" && ");
    format!("cd \"{workdir}\" && (({plain}) || ({elevated}) || ! echo \"{PERMISSION_HINT}\")")
}

/// Run the user script, print the matching sentinel and always delete the script.
///
/// The script status is kept in `build_status` and becomes the statement's exit status
/// once the script is gone; a failed removal fails the statement as well.
fn user_script_step(workdir: &str, script: &str, sentinels: &Sentinels) -> String {
    let script_path = format!("{}/{}", workdir.trim_end_matches('/'), script);
    let rm = format!("rm -f \"{script_path}\" > /dev/null 2>&1");
    format!(
        "cd \"{workdir}\" && {{ bash \"{script}\" && echo \"{ok}\" || {{ echo \"{err}\"; false; }}; }}; \
         build_status=$?; \
         {{ {rm} || sudo {rm} || ! echo \"{REMOVAL_HINT}\"; }} && exit $build_status",
        ok = sentinels.success,
        err = sentinels.failure,
    )
}
