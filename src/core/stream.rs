//! 输出片段发送端
//!
//! 有界通道：接收端跟不上时 send 等待（背压）；接收端断开后停止发送，
//! 但调用方的工作照常进行，累计内容仍然可以持久化。

use tokio::sync::mpsc;

pub const SYSTEM_ERROR_PREFIX: &str = "\n[SYSTEM ERROR]: ";

pub struct FragmentSink {
    tx: mpsc::Sender<String>,
    fragment_chars: usize,
    open: bool,
    emitted: usize,
}

impl FragmentSink {
    pub fn new(tx: mpsc::Sender<String>, fragment_chars: usize) -> Self {
        Self {
            tx,
            fragment_chars: fragment_chars.max(1),
            open: true,
            emitted: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open && !self.tx.is_closed()
    }

    /// 已成功交给接收端的片段数
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// 发送一个片段；接收端断开时返回 false 并不再尝试
    pub async fn send(&mut self, fragment: String) -> bool {
        if !self.open || fragment.is_empty() {
            return self.open;
        }
        if self.tx.send(fragment).await.is_err() {
            tracing::info!("caller disconnected, fragment emission stopped");
            self.open = false;
        } else {
            self.emitted += 1;
        }
        self.open
    }

    /// 按字符数切片发送整段文本
    pub async fn send_chunked(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(self.fragment_chars) {
            if !self.send(chunk.iter().collect()).await {
                break;
            }
        }
    }

    /// 单个错误片段
    pub async fn send_error(&mut self, message: &str) {
        self.send(format!("{SYSTEM_ERROR_PREFIX}{message}")).await;
    }
}
