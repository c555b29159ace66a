//! 房间事件流端点。
//!
//! 打开一条 SSE 长连接并在连接存活期间排空订阅句柄。
//! 每个事件按标准服务器推送约定编帧：一行事件类型、一行 JSON 数据、
//! 空行结尾（由 axum 的 `Sse` 负责）。保活由中枢的心跳巡检完成，
//! 不再叠加 axum 自带的 keep-alive。

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use application::RoomSubscription;
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use domain::RoomId;
use futures_util::Stream;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /api/chatrooms/{room_id}/stream`
///
/// 用户认证与房间成员校验由外部协作方在路由之前完成。
pub async fn stream_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
) -> Sse<EventStream> {
    let room_id = RoomId::new(room_id);
    let subscription = state.hub.subscribe(room_id);
    debug!(%room_id, channel_id = %subscription.channel_id(), "stream opened");

    Sse::new(EventStream { subscription })
}

/// 把订阅句柄适配成 SSE 事件流
///
/// 流被丢弃（客户端断开、请求超时、停机收尾）时，
/// 订阅句柄的析构负责注销通道。
pub struct EventStream {
    subscription: RoomSubscription,
}

impl Stream for EventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().subscription.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                let frame = Event::default()
                    .event(event.event)
                    .data(event.payload.to_string());
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
