use clap::Parser;
use std::path::PathBuf;

// qjs-harness - 按固定顺序运行 QuickJS 测试程序
#[derive(Parser, Debug)]
#[clap(
    name = "qjs-harness",
    version,
    about = "Run the QuickJS conformance test catalog against native executables",
    after_help = "EXAMPLES:\n  qjs-harness --config harness.toml\n  qjs-harness --native-dir lib/ --assets-dir assets/ --data-dir data/\n  qjs-harness --list"
)]
pub struct CliArgs {
    // Config file - defaults to ./harness.toml when present
    // 配置文件 - 默认读取当前目录下的 harness.toml
    #[clap(short = 'c', long = "config", help = "Harness configuration file")]
    pub config: Option<PathBuf>,

    // Directory holding lib<name>.so executables
    // 测试程序所在目录
    #[clap(long = "native-dir", help = "Directory containing lib<name>.so executables")]
    pub native_dir: Option<PathBuf>,

    // Directory holding the fixture archive and marker
    // 测试资源目录
    #[clap(long = "assets-dir", help = "Directory containing the fixture archive")]
    pub assets_dir: Option<PathBuf>,

    // Writable data directory
    // 可写数据目录
    #[clap(long = "data-dir", help = "Writable directory for the fixture tree")]
    pub data_dir: Option<PathBuf>,

    // Markdown summary output
    // 汇总报告输出路径
    #[clap(short = 'o', long = "report", help = "Write a Markdown summary to this file")]
    pub report: Option<PathBuf>,

    // Print the catalog and exit
    // 仅列出测试用例
    #[clap(short = 'l', long = "list", help = "List the test catalog without running it")]
    pub list: bool,

    // Verbose mode - Show more log information
    // 详细模式 - 显示更多日志信息
    #[clap(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub verbose: bool,

    // Quiet mode - Only errors are logged
    // 安静模式 - 只输出错误日志
    #[clap(short = 'q', long = "quiet", help = "Suppress non-essential output")]
    pub quiet: bool,
}

impl CliArgs {
    pub const DEFAULT_CONFIG: &'static str = "harness.toml";

    /// Parse command line arguments
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get log level
    /// 获取日志级别
    pub fn get_log_level(&self) -> &str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
