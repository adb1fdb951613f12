use clap::Parser;

#[derive(Parser)]
#[command(name = "lancast")]
#[command(about = "📡 Mirror a screen to viewers on the local network", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Port the sharing server binds to (presenter mode)
    #[arg(short, long, default_value_t = 9000)]
    pub port: u16,

    /// Capture frame rate in frames per second (presenter mode)
    #[arg(short, long, default_value_t = 10)]
    pub fps: u32,

    /// Force a terminal graphics protocol: sixel, kitty, iterm2, halfblocks
    #[arg(short, long)]
    pub graphics: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
