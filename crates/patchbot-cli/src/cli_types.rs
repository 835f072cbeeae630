use clap::ValueEnum;
use patchbot_pipeline::ChangeVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliChangeVariant {
    FileSet,
    Diff,
}

impl From<CliChangeVariant> for ChangeVariant {
    fn from(value: CliChangeVariant) -> Self {
        match value {
            CliChangeVariant::FileSet => ChangeVariant::FileSet,
            CliChangeVariant::Diff => ChangeVariant::Diff,
        }
    }
}
