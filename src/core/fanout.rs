//! Fan-out 协调器：按设备并发执行调查
//!
//! 每台设备一个 worker，Semaphore 限制同时在跑的数量（保护下游工具链路）。
//! 等全部 worker 结束后统一返回；单台设备的 panic 或失败不取消兄弟任务，
//! 失败记入该设备自己的状态。各 worker 独占自己的 DeviceInvestigation，无共享可变状态。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::{DeviceInvestigation, DeviceInvestigator};

/// Fan-out 协调器：只持有并发上限
pub struct FanOutCoordinator {
    limit: usize,
}

impl FanOutCoordinator {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    /// 并发执行一批设备调查，返回 设备名 -> 完成状态 的映射。
    /// worker 任务异常（panic）时回退到启动前的快照并记录失败原因。
    pub async fn run_all(
        &self,
        investigator: Arc<DeviceInvestigator>,
        jobs: Vec<DeviceInvestigation>,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> HashMap<String, DeviceInvestigation> {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut join_set = JoinSet::new();

        // 启动前快照：worker panic 时据此恢复，不丢已有历史
        let mut snapshots: HashMap<String, DeviceInvestigation> = jobs
            .iter()
            .map(|j| (j.device_name.clone(), j.clone()))
            .collect();

        for job in jobs {
            let investigator = Arc::clone(&investigator);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fan-out semaphore closed");
                investigator.run(job, attempt, &cancel).await
            });
        }

        let mut finished = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(inv) => {
                    snapshots.remove(&inv.device_name);
                    finished.insert(inv.device_name.clone(), inv);
                }
                Err(e) => {
                    tracing::error!("Device worker task failed: {e}");
                    // 无法知道是哪台设备的任务，留到循环结束后按快照兜底
                }
            }
        }

        // 没有正常返回的设备：保留快照并记录任务失败
        for (name, mut snapshot) in snapshots {
            snapshot.note_limitation(format!("attempt {attempt}: investigator task failed"));
            finished.insert(name, snapshot);
        }

        finished
    }
}
