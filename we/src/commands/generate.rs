use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::{args::WeArgs, CommandOutput, WeDeploy};

impl WeDeploy {
    pub async fn generate_completions(
        &self,
        shell: Shell,
        output_file: Option<PathBuf>,
    ) -> Result<CommandOutput> {
        let name = "we";
        let mut app = WeArgs::command();
        let mut output = Vec::new();

        generate(shell, &mut app, name, &mut output);
        match output_file {
            Some(path) => fs::File::create(path)?.write_all(&output)?,
            None => io::stdout().write_all(&output)?,
        };

        Ok(CommandOutput::None)
    }
}
