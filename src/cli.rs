use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::app::CaptionInput;
use crate::prompt::Tone;

#[derive(Debug, Parser)]
#[command(name = "brandcap")]
#[command(about = "Brand-aware product captions from a catalog or a generative model", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging, including caption traces
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Caption one asset by name, description, or image
    Caption {
        /// Asset filename, e.g. IMG001_red_dress.jpg
        name: Option<String>,

        /// Base description used when the catalog has no match
        #[arg(short, long)]
        describe: Option<String>,

        /// Image to describe when neither catalog nor description applies
        #[arg(short, long)]
        image: Option<PathBuf>,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// Caption a random row of the sample table
    Sample {
        /// Seed for a reproducible pick
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        style: StyleArgs,
    },

    /// List catalog entries
    Catalog,

    /// List tones and their templates
    Tones,

    /// Caption one asset name per stdin line, reloading config on change
    Watch {
        #[command(flatten)]
        style: StyleArgs,
    },
}

/// Generation knobs shared by the captioning commands.
#[derive(Debug, Clone, Default, Args)]
pub struct StyleArgs {
    /// trendy, formal, luxury, playful, minimalist, or fun
    #[arg(short, long)]
    pub tone: Option<Tone>,

    /// Sampling temperature (0.5 to 1.5)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum caption length in tokens (20 to 80)
    #[arg(long)]
    pub max_length: Option<u32>,

    /// Append accepted captions to the result log
    #[arg(short, long)]
    pub save: bool,
}

impl StyleArgs {
    pub fn to_input(&self) -> CaptionInput {
        CaptionInput {
            tone: self.tone,
            temperature: self.temperature,
            max_length: self.max_length,
            save: self.save,
            ..CaptionInput::default()
        }
    }
}
