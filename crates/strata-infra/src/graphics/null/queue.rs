// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::backend::NullBackend;
use super::command::{NullCommand, NullCommandList};
use super::execution_log::{ExecutedCommand, ExecutionLog, NullCommandKind};
use super::fence::NullFence;
use std::sync::Arc;
use std::time::Duration;
use strata_rhi::{
    DeviceIndex, HardwareQueueClass, NativeFence, NativeQueue, RhiError, RhiResult,
};

/// A queue that replays command lists on the calling thread.
///
/// The RHI only ever submits from the queue's worker thread, so replaying
/// synchronously keeps each queue's submissions in order.
#[derive(Debug)]
pub struct NullQueue {
    queue_class: HardwareQueueClass,
    device_index: DeviceIndex,
    latency: Duration,
    wait_timeout: Duration,
    log: Arc<ExecutionLog>,
}

impl NullQueue {
    pub(crate) fn new(
        queue_class: HardwareQueueClass,
        device_index: DeviceIndex,
        latency: Duration,
        wait_timeout: Duration,
        log: Arc<ExecutionLog>,
    ) -> Self {
        Self {
            queue_class,
            device_index,
            latency,
            wait_timeout,
            log,
        }
    }

    /// The queue class served.
    pub fn queue_class(&self) -> HardwareQueueClass {
        self.queue_class
    }

    fn record(&self, label: &str, kind: NullCommandKind) {
        self.log.record(ExecutedCommand {
            device_index: self.device_index,
            queue_class: self.queue_class,
            list_label: label.to_owned(),
            kind,
        });
    }

    fn replay(&self, list: &NullCommandList) -> RhiResult<()> {
        for command in list.commands() {
            match command {
                NullCommand::Wait { fence, value } => {
                    if !fence.wait_on_cpu(*value, self.wait_timeout) {
                        log::error!(
                            "{} queue of device {} timed out waiting for fence value {} in '{}'",
                            self.queue_class,
                            self.device_index,
                            value,
                            list.label()
                        );
                        return Err(RhiError::NotReady(format!(
                            "fence value {value} not reached within {:?}",
                            self.wait_timeout
                        )));
                    }
                    self.record(list.label(), NullCommandKind::Wait { value: *value });
                }
                NullCommand::Execute(kind) => self.record(list.label(), kind.clone()),
            }
        }
        Ok(())
    }
}

impl NativeQueue<NullBackend> for NullQueue {
    fn submit(
        &self,
        command_lists: &[&NullCommandList],
        signal: Option<(&NullFence, u64)>,
    ) -> RhiResult<()> {
        if !self.latency.is_zero() && !command_lists.is_empty() {
            std::thread::sleep(self.latency);
        }
        for list in command_lists {
            self.replay(list)?;
        }
        if let Some((fence, value)) = signal {
            self.record("", NullCommandKind::Signal { value });
            fence.signal_on_cpu(value);
        }
        Ok(())
    }

    fn wait_for_idle(&self) -> RhiResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_rhi::NativeCommandList;

    fn queue(log: &Arc<ExecutionLog>, timeout: Duration) -> NullQueue {
        NullQueue::new(
            HardwareQueueClass::Compute,
            0,
            Duration::ZERO,
            timeout,
            log.clone(),
        )
    }

    #[test]
    fn submit_replays_then_signals() {
        let log = Arc::new(ExecutionLog::new());
        let queue = queue(&log, Duration::from_secs(1));
        let fence = NullFence::new(0);

        let mut list = NullCommandList::new(HardwareQueueClass::Compute);
        list.begin("pass").unwrap();
        list.begin_debug_marker("blur");
        list.end_debug_marker();
        list.end().unwrap();

        queue.submit(&[&list], Some((&fence, 4))).unwrap();
        assert_eq!(fence.completed_value(), 4);

        let kinds: Vec<_> = log.snapshot().into_iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NullCommandKind::BeginMarker("blur".into()),
                NullCommandKind::EndMarker,
                NullCommandKind::Signal { value: 4 },
            ]
        );
    }

    #[test]
    fn unsatisfied_wait_is_not_ready() {
        let log = Arc::new(ExecutionLog::new());
        let queue = queue(&log, Duration::from_millis(10));
        let other = NullFence::new(0);

        let mut list = NullCommandList::new(HardwareQueueClass::Compute);
        list.begin("blocked").unwrap();
        list.encode_wait_event(&other, 1);
        list.end().unwrap();

        let err = queue.submit(&[&list], None).unwrap_err();
        assert!(matches!(err, RhiError::NotReady(_)));
        assert!(log.is_empty());
    }
}
