use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::curriculum::StageCommand;
use crate::monitor::ResetRequest;
use crate::params::SharedParams;
use crate::sim_interface::task_control_server::{TaskControl, TaskControlServer};
use crate::sim_interface::{Empty, ResetCompleted, StageTrigger, TaskParams};

/// Control surface exposed to the process owner: on-demand resets, stage
/// triggers, shared params and the reset-completed stream.
pub struct ControlService {
    params: Arc<SharedParams>,
    reset_counter: watch::Receiver<u64>,
    reset_requests: Option<mpsc::Sender<ResetRequest>>,
    stage_commands: Option<mpsc::Sender<StageCommand>>,
}

impl ControlService {
    pub fn new(
        params: Arc<SharedParams>,
        reset_counter: watch::Receiver<u64>,
        reset_requests: Option<mpsc::Sender<ResetRequest>>,
        stage_commands: Option<mpsc::Sender<StageCommand>>,
    ) -> Self {
        Self {
            params,
            reset_counter,
            reset_requests,
            stage_commands,
        }
    }

    async fn send_stage_command(&self, command: StageCommand) -> Result<Response<Empty>, Status> {
        let Some(commands) = &self.stage_commands else {
            return Err(Status::unavailable("task mode has no curriculum stages"));
        };
        commands
            .send(command)
            .await
            .map_err(|_| Status::unavailable("stage command loop has stopped"))?;
        Ok(Response::new(Empty {}))
    }
}

#[tonic::async_trait]
impl TaskControl for ControlService {
    async fn trigger_reset(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let Some(requests) = &self.reset_requests else {
            return Err(Status::unavailable(
                "auto-reset mode accepts no external reset requests",
            ));
        };
        info!("task reset request received");
        let (done, completed) = oneshot::channel();
        requests
            .send(ResetRequest { done })
            .await
            .map_err(|_| Status::unavailable("reset loop has stopped"))?;
        completed
            .await
            .map_err(|_| Status::aborted("reset did not complete"))?;
        Ok(Response::new(Empty {}))
    }

    async fn next_stage(&self, _request: Request<StageTrigger>) -> Result<Response<Empty>, Status> {
        self.send_stage_command(StageCommand::Advance).await
    }

    async fn previous_stage(
        &self,
        _request: Request<StageTrigger>,
    ) -> Result<Response<Empty>, Status> {
        self.send_stage_command(StageCommand::Retreat).await
    }

    async fn get_task_params(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<TaskParams>, Status> {
        Ok(Response::new(TaskParams {
            task_mode: self.params.task_mode(),
            curr_stage: self.params.curr_stage(),
            last_stage_reached: self.params.last_stage_reached(),
        }))
    }

    type SubscribeResetCompletedStream =
        Pin<Box<dyn Stream<Item = Result<ResetCompleted, Status>> + Send + 'static>>;

    async fn subscribe_reset_completed(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::SubscribeResetCompletedStream>, Status> {
        let stream = WatchStream::new(self.reset_counter.clone())
            .map(|counter| Ok(ResetCompleted { counter }));
        Ok(Response::new(Box::pin(stream)))
    }
}

pub async fn serve(
    service: ControlService,
    addr: SocketAddr,
) -> Result<(), tonic::transport::Error> {
    info!(%addr, "serving task control");
    Server::builder()
        .add_service(TaskControlServer::new(service))
        .serve(addr)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(
        reset_requests: Option<mpsc::Sender<ResetRequest>>,
        stage_commands: Option<mpsc::Sender<StageCommand>>,
    ) -> (Arc<SharedParams>, ControlService) {
        let params = Arc::new(SharedParams::new());
        let (_reset_tx, reset_rx) = watch::channel(0u64);
        let service = ControlService::new(
            Arc::clone(&params),
            reset_rx,
            reset_requests,
            stage_commands,
        );
        (params, service)
    }

    #[tokio::test]
    async fn auto_mode_rejects_external_resets() {
        let (_params, service) = service(None, None);
        let status = service
            .trigger_reset(Request::new(Empty {}))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn reset_request_waits_for_acknowledgement() {
        let (request_tx, mut request_rx) = mpsc::channel(1);
        let (_params, service) = service(Some(request_tx), None);

        let acker = tokio::spawn(async move {
            let request = request_rx.recv().await.unwrap();
            request.done.send(()).unwrap();
        });

        service.trigger_reset(Request::new(Empty {})).await.unwrap();
        acker.await.unwrap();
    }

    #[tokio::test]
    async fn stage_triggers_forward_commands() {
        let (command_tx, mut command_rx) = mpsc::channel(2);
        let (_params, service) = service(None, Some(command_tx));

        service
            .next_stage(Request::new(StageTrigger { value: true }))
            .await
            .unwrap();
        service
            .previous_stage(Request::new(StageTrigger { value: true }))
            .await
            .unwrap();

        assert_eq!(command_rx.recv().await, Some(StageCommand::Advance));
        assert_eq!(command_rx.recv().await, Some(StageCommand::Retreat));
    }

    #[tokio::test]
    async fn stage_triggers_require_staged_mode() {
        let (_params, service) = service(None, None);
        let status = service
            .next_stage(Request::new(StageTrigger { value: true }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn params_are_readable() {
        let (params, service) = service(None, None);
        params.set_task_mode("random");
        params.set_curr_stage(2);

        let response = service
            .get_task_params(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.task_mode, "random");
        assert_eq!(response.curr_stage, 2);
        assert!(!response.last_stage_reached);
    }
}
