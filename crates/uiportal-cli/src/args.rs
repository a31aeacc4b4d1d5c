//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive a device UI from an automation agent.
///
/// Query the visible element tree and device state as structured JSON, send
/// keyboard input, and control the annotation overlay. Designed for AI agent
/// consumption: every response is a uniform success/error envelope.
#[derive(Debug, Parser)]
#[command(name = "uiportal", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that the daemon answers
    Ping,

    /// Dump the visible UI element tree
    #[command(after_help = "\
Examples:
  uiportal tree                         # Serialized element forest as JSON
  uiportal tree | jq '.[0].children'    # Drill into the first root")]
    Tree,

    /// Show device and focus state
    PhoneState,

    /// Show element tree and device state in one capture
    State,

    /// Type text into the focused field via the keyboard bridge
    #[command(
        name = "type",
        after_help = "\
Examples:
  uiportal type 'Hello, world!'         # Replace the field content
  uiportal type --append '!'            # Append instead of replacing"
    )]
    Type(TypeArgs),

    /// Set text directly on the focused element, bypassing the keyboard
    SetText(SetTextArgs),

    /// Clear all text in the focused field
    Clear,

    /// Send a key event by name or key code
    #[command(after_help = "\
Named keys: Enter, Tab, Space, Back, Home, Del, Esc, Up, Down, Left, Right,
Menu, Power, VolumeUp, VolumeDown, AppSwitch

Examples:
  uiportal key Enter                    # Press enter
  uiportal key Back                     # Navigate back
  uiportal key 66                       # Raw key code")]
    Key(KeyArgs),

    /// Shift every overlay annotation vertically
    #[command(after_help = "\
Examples:
  uiportal overlay-offset -- -48        # Shift annotations 48px up
  uiportal overlay-offset 0             # Back to uncorrected positions")]
    OverlayOffset(OverlayOffsetArgs),

    /// Show an end-to-end usage example
    Examples,

    /// Start the daemon process (usually auto-started)
    Daemon(DaemonArgs),

    /// Stop the daemon process
    Stop,
}

#[derive(Debug, clap::Args)]
pub struct TypeArgs {
    /// Text to type
    pub text: String,

    /// Append to the existing field content instead of replacing it
    #[arg(long)]
    pub append: bool,
}

#[derive(Debug, clap::Args)]
pub struct SetTextArgs {
    /// Text to set
    pub text: String,

    /// Append to the existing field content instead of replacing it
    #[arg(long)]
    pub append: bool,
}

#[derive(Debug, clap::Args)]
pub struct KeyArgs {
    /// Key name (Enter, Back, ...) or numeric key code
    pub key: String,
}

#[derive(Debug, clap::Args)]
pub struct OverlayOffsetArgs {
    /// Vertical offset in pixels; negative shifts annotations up
    #[arg(allow_hyphen_values = true)]
    pub offset: i32,
}

#[derive(Debug, Clone, clap::Args)]
pub struct DaemonArgs {
    /// Where to publish the overlay frame (default: runtime dir)
    #[arg(long)]
    pub frame_path: Option<PathBuf>,

    /// Overlay frame width in pixels
    #[arg(long, default_value_t = 1080)]
    pub width: u32,

    /// Overlay frame height in pixels
    #[arg(long, default_value_t = 2400)]
    pub height: u32,

    /// Settle delay before the overlay surface is declared ready, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub settle_ms: u64,

    /// Maximum element tree depth the serializer accepts
    #[arg(long, default_value_t = 64)]
    pub max_tree_depth: usize,
}

pub const EXAMPLES_TEXT: &str = "\
# Capture what's on screen
uiportal state | jq '.phone_state'

# Read the element tree and pick an index
uiportal tree | jq '.[0].children[] | {index, text}'

# Type into the focused field
uiportal type 'search term'
uiportal key Enter

# Nudge the overlay annotations to line up with the real UI
uiportal overlay-offset -- -48

# Shut the daemon down when finished
uiportal stop
";
