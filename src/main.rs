use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use codebot::common::{init_logging, load_config, wait_for_shutdown_signal, StartupConfig};
use codebot::executor::CommandExecutor;
use codebot::intake::{feed_jobs, DEFAULT_FULL_QUEUE_PAUSE};
use codebot_core::DispatchError;
use codebot_dispatcher::Dispatcher;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("创建Tokio运行时失败")?;
    let result = runtime.block_on(run());
    // 标准输入的阻塞读取无法取消，退出时不等待它
    runtime.shutdown_background();
    result
}

async fn run() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("codebot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("代码生成机器人任务分发器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找默认路径"),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .value_name("FILE")
                .help("任务输入文件，每行一个JSON任务，默认读取标准输入"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let startup_config = StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        log_format: matches.get_one::<String>("log-format").cloned(),
        jobs_path: matches.get_one::<String>("jobs").cloned(),
    };

    // 加载配置
    let config = load_config(&startup_config)?;

    // 初始化日志系统
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动代码生成机器人任务分发器");
    if let Some(ref path) = startup_config.config_path {
        info!("配置文件: {path}");
    }
    info!(
        "执行命令: {} {:?}, 超时: {}s",
        config.executor.command, config.executor.args, config.executor.timeout_seconds
    );

    let executor = Arc::new(CommandExecutor::from_settings(&config.executor));
    let dispatcher = Dispatcher::new(executor, config.dispatcher.to_dispatcher_config());

    // 收到信号后停止读取输入
    let stop = CancellationToken::new();
    let signal_handle = {
        let stop = stop.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            stop.cancel();
        })
    };

    let reader = open_jobs(startup_config.jobs_path.as_deref()).await?;
    match feed_jobs(reader, &dispatcher, &stop, DEFAULT_FULL_QUEUE_PAUSE).await {
        Ok(summary) => info!(
            "任务输入结束: accepted={}, invalid={}, full_waits={}",
            summary.accepted, summary.invalid, summary.full_waits
        ),
        Err(e) => error!("读取任务输入失败: {e:#}"),
    }

    info!("开始优雅关闭...");
    let grace = config.shutdown.grace_period();
    let result = dispatcher.shutdown_timeout(grace).await;
    signal_handle.abort();

    match result {
        Ok(()) => {
            info!("任务分发器已优雅关闭: {:?}", dispatcher.stats());
            Ok(())
        }
        Err(DispatchError::ShutdownInterrupted { in_flight }) => {
            warn!(
                "关闭等待超过 {}s，已取消 {} 个执行中的Worker",
                grace.as_secs(),
                in_flight
            );
            Err(DispatchError::ShutdownInterrupted { in_flight }.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn open_jobs(path: Option<&str>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some("-") | None => {
            info!("从标准输入读取任务");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
        Some(path) => {
            info!("从文件读取任务: {path}");
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("打开任务文件失败: {path}"))?;
            Ok(Box::new(BufReader::new(file)))
        }
    }
}
