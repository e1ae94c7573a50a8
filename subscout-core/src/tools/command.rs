use std::path::PathBuf;

use subscout_model::{ScanOptions, ToolName};

use crate::{
    config::OrchestratorConfig,
    error::{Result, ScanError},
    tracker::TrackerKey,
};

/// How a tool hands back what it found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputStrategy {
    /// One entity per stdout line, read as the tool runs.
    Streaming,
    /// A JSON document written to `output_file` by the time the tool exits.
    Batch { output_file: PathBuf },
}

/// A fully resolved invocation, ready to hand to `tokio::process::Command`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub tool: ToolName,
    pub program: String,
    pub args: Vec<String>,
    pub strategy: OutputStrategy,
}

impl ToolCommand {
    pub fn build(
        tool: ToolName,
        domain: &str,
        key: &TrackerKey,
        options: &ScanOptions,
        config: &OrchestratorConfig,
    ) -> Result<Self> {
        let (tool_args, strategy): (Vec<String>, OutputStrategy) = match tool {
            ToolName::Amass => (
                vec!["enum".into(), "-passive".into(), "-d".into(), domain.into()],
                OutputStrategy::Streaming,
            ),
            ToolName::Subfinder => (
                vec!["-d".into(), domain.into(), "-silent".into()],
                OutputStrategy::Streaming,
            ),
            ToolName::TheHarvester => {
                let file_name = format!(
                    "harvester_{}_{}.json",
                    key.run.simple(),
                    domain.replace('.', "_")
                );
                let sources = options
                    .sources
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(&config.harvester_sources);
                let tool_path = config.tools.tool_output_dir().join(&file_name);
                (
                    vec![
                        "-d".into(),
                        domain.into(),
                        "-b".into(),
                        sources.to_string(),
                        "-f".into(),
                        tool_path.to_string_lossy().into_owned(),
                    ],
                    OutputStrategy::Batch {
                        output_file: config.tools.output_dir.join(&file_name),
                    },
                )
            }
        };

        let (program, args) =
            Self::resolve(tool, config, tool_args.into_iter())?;
        Ok(Self {
            tool,
            program,
            args,
            strategy,
        })
    }

    /// Command printing the tool's version, used by health probes.
    pub fn version(tool: ToolName, config: &OrchestratorConfig) -> Result<Self> {
        let flag = match tool {
            ToolName::Amass | ToolName::Subfinder => "-version",
            ToolName::TheHarvester => "-h",
        };
        let (program, args) =
            Self::resolve(tool, config, std::iter::once(flag.to_string()))?;
        Ok(Self {
            tool,
            program,
            args,
            strategy: OutputStrategy::Streaming,
        })
    }

    fn resolve(
        tool: ToolName,
        config: &OrchestratorConfig,
        tool_args: impl Iterator<Item = String>,
    ) -> Result<(String, Vec<String>)> {
        let base = config.tools.base_command(tool);
        let Some((binary, leading)) = base.split_first() else {
            return Err(ScanError::Internal(format!(
                "no command configured for {tool}"
            )));
        };

        let mut argv: Vec<String> = Vec::new();
        let program = match &config.tools.container {
            Some(container) => {
                argv.push("exec".into());
                argv.push(container.clone());
                argv.push(binary.clone());
                config.tools.docker_bin.clone()
            }
            None => binary.clone(),
        };
        argv.extend(leading.iter().cloned());
        argv.extend(tool_args);
        Ok((program, argv))
    }

    /// Rendered for logs only; never fed back to a shell.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
