use anyhow::Result;
use question_bank_dispatch::{logger, App, Config};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：第一个参数为 TOML 配置文件，否则读取环境变量
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env(),
    };

    // 初始化日志（控制台 + 运行日志文件）
    logger::init(config.verbose_logging, Some(&config.output_log_file))?;

    // 初始化应用
    let app = App::initialize(config).await?;

    // Ctrl-C 后不再派发新题目，进行中的调用完成后正常退出
    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到中断信号，停止派发新题目");
            cancel.cancel();
        }
    });

    app.run().await?;

    Ok(())
}
