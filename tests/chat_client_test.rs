// Chat client behaviour over the in-memory transport.
//
// All tests run on a paused clock: waiting on `listener.accept()` while the
// client sleeps auto-advances time to the next timer.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{settle, EventLog, Harness, MockRpc};
use serde_json::json;
use stagefeed::chat::{ChatClient, ChatHistory, ChatSettings, CustomCommand, MemoryChatHistory};
use stagefeed::events::{ChannelEvent, ChannelEventType, EventData};
use tokio::time::Instant;

const VIEWER_LINE: &str = "@badges=subscriber/12;color=#FF4500;display-name=Viewer;emotes=25:0-4 \
    :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #chan :Kappa nice run";

fn settings() -> ChatSettings {
    ChatSettings {
        url: "mem://chat".into(),
        ..ChatSettings::default()
    }
}

fn spawn(h: &Harness, settings: ChatSettings) -> (ChatClient, Arc<MemoryChatHistory>) {
    let history = Arc::new(MemoryChatHistory::default());
    let client = ChatClient::spawn(
        h.ctx.clone(),
        settings,
        Arc::clone(&h.status) as _,
        Arc::clone(&history) as _,
    );
    (client, history)
}

fn privmsg_from(nick: &str, text: &str) -> String {
    format!(":{nick}!{nick}@{nick}.tmi.twitch.tv PRIVMSG #chan :{text}\r\n")
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_login_sequence() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());

    client.connect("#SomeStreamer").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();

    assert_eq!(server.url(), "mem://chat");
    assert_eq!(
        server.drain(),
        vec![
            "CAP REQ :twitch.tv/tags",
            "NICK justinfan12345",
            "JOIN #somestreamer",
        ]
    );
    assert_eq!(h.status.last(), Some(true));

    let state = client.state().await.unwrap();
    assert!(!state.authenticated);
    assert_eq!(state.channel.as_deref(), Some("somestreamer"));
    assert_eq!(state.nick.as_deref(), Some("justinfan12345"));
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_login_sequence() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok123"));
    let (client, _history) = spawn(&h, settings());

    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();

    assert_eq!(
        server.drain(),
        vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership",
            "PASS oauth:tok123",
            "NICK MyBot",
            "JOIN #chan",
        ]
    );
    let state = client.state().await.unwrap();
    assert!(state.authenticated);
    assert_eq!(state.nick.as_deref(), Some("mybot"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_channel_only_disconnects() {
    let h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());

    client.connect("#").await.unwrap();
    assert_eq!(h.connector.attempts(), 0);
    assert_eq!(client.state().await.unwrap().channel, None);
}

#[tokio::test(start_paused = true)]
async fn test_ping_is_answered() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    assert!(server.send_text("PING :tmi.twitch.tv\r\n"));
    assert_eq!(server.recv().await.as_deref(), Some("PONG :tmi.twitch.tv"));
}

#[tokio::test(start_paused = true)]
async fn test_chat_message_is_published_and_stored() {
    let mut h = Harness::new(MockRpc::anonymous());
    let log = EventLog::attach(&h.bus);
    let (client, history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    server.send_text(&format!("{VIEWER_LINE}\r\n"));
    settle().await;

    let events = log.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.kind, ChannelEventType::Chat);
    assert_eq!(event.data["username"], "Viewer");
    assert_eq!(event.data["colour"], "#FF4500");
    assert_eq!(event.data["text"], "Kappa nice run");
    assert_eq!(event.data["badges"], json!([{ "setId": "subscriber", "versionId": "12" }]));
    assert_eq!(event.data["emotes"], json!([{ "id": "25", "start": 0, "end": 4 }]));

    let stored = history.messages();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "Kappa nice run");
    assert_eq!(stored[0].timestamp, event.timestamp);
}

#[tokio::test(start_paused = true)]
async fn test_lines_in_one_frame_keep_wire_order() {
    let mut h = Harness::new(MockRpc::anonymous());
    let log = EventLog::attach(&h.bus);
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    let frame = format!(
        "{}{}{}",
        privmsg_from("alice", "one"),
        privmsg_from("bob", "two"),
        privmsg_from("carol", "three")
    );
    server.send_text(&frame);
    settle().await;

    let texts: Vec<_> = log
        .events()
        .iter()
        .map(|e| e.str_field("text").unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test(start_paused = true)]
async fn test_own_echo_is_suppressed_once() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let log = EventLog::attach(&h.bus);
    let (client, history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    assert!(client.send_chat_message("hello chat").await.unwrap());
    assert_eq!(server.recv().await.as_deref(), Some("PRIVMSG #chan :hello chat"));

    // Outbound messages go to history but not the bus.
    assert_eq!(history.len(), 1);
    assert_eq!(history.messages()[0].username, "MyBot");
    assert!(log.events().is_empty());

    server.send_text(&privmsg_from("mybot", "hello chat"));
    settle().await;
    assert!(log.events().is_empty());
    assert_eq!(history.len(), 1);

    // Same text again from our nick: nothing pending, so it is real.
    server.send_text(&privmsg_from("mybot", "hello chat"));
    // Same text from someone else is never an echo.
    server.send_text(&privmsg_from("viewer", "hello chat"));
    settle().await;
    assert_eq!(log.kinds(), vec!["chat", "chat"]);
    assert_eq!(history.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_line_breaks_cannot_start_new_commands() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let log = EventLog::attach(&h.bus);
    let (client, history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    assert!(client
        .send_chat_message("hi\r\nPART #chan\nbye")
        .await
        .unwrap());
    settle().await;
    assert_eq!(server.drain(), vec!["PRIVMSG #chan :hi  PART #chan bye"]);
    assert_eq!(history.messages()[0].text, "hi  PART #chan bye");

    // The echo is tracked under the text that actually went out.
    server.send_text(&privmsg_from("mybot", "hi  PART #chan bye"));
    settle().await;
    assert!(log.events().is_empty());

    assert!(!client.send_chat_message("\r\n").await.unwrap());
    settle().await;
    assert!(server.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_echo_window_expires() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let log = EventLog::attach(&h.bus);
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    client.send_chat_message("late").await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    server.send_text(&privmsg_from("mybot", "late"));
    settle().await;
    assert_eq!(log.kinds(), vec!["chat"]);
}

#[tokio::test(start_paused = true)]
async fn test_join_and_part_skip_own_nick() {
    let mut h = Harness::new(MockRpc::anonymous());
    let log = EventLog::attach(&h.bus);
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    server.send_text(
        ":justinfan12345!justinfan12345@justinfan12345.tmi.twitch.tv JOIN #chan\r\n\
         :viewer!viewer@viewer.tmi.twitch.tv JOIN #chan\r\n\
         @badge-info= :viewer!viewer@viewer.tmi.twitch.tv PART #chan\r\n",
    );
    settle().await;

    let events = log.events();
    assert_eq!(log.kinds(), vec!["join", "part"]);
    assert_eq!(events[0].data["username"], "viewer");
    assert_eq!(events[1].data["username"], "viewer");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_lines_are_ignored() {
    let mut h = Harness::new(MockRpc::anonymous());
    let log = EventLog::attach(&h.bus);
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    server.send_text(
        ":tmi.twitch.tv 001 justinfan12345 :Welcome, GLHF!\r\n\
         :tmi.twitch.tv CAP * ACK :twitch.tv/tags\r\n\
         @room-id=1 :tmi.twitch.tv ROOMSTATE #chan\r\n",
    );
    settle().await;
    assert!(log.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_own_colour_is_cached_from_userstate() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let (client, history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    server.send_text("@color=#1E90FF;display-name=MyBot :tmi.twitch.tv GLOBALUSERSTATE\r\n");
    server.send_text("@color= :tmi.twitch.tv USERSTATE #chan\r\n");
    settle().await;

    assert_eq!(
        client.state().await.unwrap().colour.as_deref(),
        Some("#1E90FF")
    );
    client.send_chat_message("hi").await.unwrap();
    assert_eq!(history.messages()[0].colour, "#1E90FF");
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_close_reconnects_once() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let server = h.listener.accept().await.unwrap();

    let closed_at = Instant::now();
    drop(server);
    settle().await;
    assert_eq!(h.status.last(), Some(false));
    assert!(client.state().await.unwrap().reconnect_pending);

    let mut server = h.listener.accept().await.unwrap();
    assert!(closed_at.elapsed() >= Duration::from_secs(3));
    assert_eq!(server.drain().last().map(String::as_str), Some("JOIN #chan"));
    assert_eq!(h.status.last(), Some(true));

    settle().await;
    assert_eq!(h.connector.attempts(), 2);
    assert!(h.listener.try_accept().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    drop(h.listener.accept().await.unwrap());
    settle().await;
    assert!(client.state().await.unwrap().reconnect_pending);

    client.disconnect().await.unwrap();
    let state = client.state().await.unwrap();
    assert!(!state.reconnect_pending);
    assert_eq!(state.channel, None);

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 1);
    assert!(h.listener.try_accept().is_none());

    // Idempotent, and sending is a no-op while disconnected.
    client.disconnect().await.unwrap();
    assert!(!client.send_chat_message("anyone?").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_socket_without_reconnect() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    client.disconnect().await.unwrap();
    assert_eq!(server.recv().await, None);
    assert_eq!(h.status.last(), Some(false));

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_switches_channels() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());

    client.connect("first").await.unwrap();
    let mut first = h.listener.accept().await.unwrap();
    first.drain();

    client.connect("second").await.unwrap();
    let mut second = h.listener.accept().await.unwrap();
    assert_eq!(first.recv().await, None);
    assert_eq!(second.drain().last().map(String::as_str), Some("JOIN #second"));

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_retries_after_delay() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    h.connector.fail_next("connection refused");

    let started = Instant::now();
    client.connect("chan").await.unwrap();
    assert!(client.state().await.unwrap().reconnect_pending);

    let mut server = h.listener.accept().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(server.drain().last().map(String::as_str), Some("JOIN #chan"));
}

#[tokio::test(start_paused = true)]
async fn test_command_responder_answers_with_stats() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let settings = ChatSettings {
        commands: vec![CustomCommand {
            trigger: "!game".into(),
            response: "Playing {game} for {uptime}".into(),
            enabled: true,
        }],
        ..settings()
    };
    let (client, history) = spawn(&h, settings);
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    let mut data = EventData::new();
    data.insert("title".into(), "Any%".into());
    data.insert("category_name".into(), "Celeste".into());
    h.bus
        .publish(&ChannelEvent::now(ChannelEventType::ChannelUpdate, data));

    server.send_text(&privmsg_from("viewer", "!GAME please"));
    assert_eq!(
        server.recv().await.as_deref(),
        Some("PRIVMSG #chan :Playing Celeste for offline")
    );

    // Shared cooldown.
    server.send_text(&privmsg_from("viewer", "!game"));
    settle().await;
    assert!(server.drain().is_empty());

    tokio::time::advance(Duration::from_secs(5)).await;
    server.send_text(&privmsg_from("viewer", "!game"));
    assert_eq!(
        server.recv().await.as_deref(),
        Some("PRIVMSG #chan :Playing Celeste for offline")
    );

    // Viewer messages plus our two responses.
    assert_eq!(history.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_send_runs_responder() {
    let mut h = Harness::new(MockRpc::authenticated("MyBot", "tok"));
    let settings = ChatSettings {
        commands: vec![CustomCommand {
            trigger: "!followers".into(),
            response: "{followers} followers".into(),
            enabled: true,
        }],
        ..settings()
    };
    let (client, _history) = spawn(&h, settings);
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    client.send_chat_message("!followers").await.unwrap();
    assert_eq!(server.recv().await.as_deref(), Some("PRIVMSG #chan :!followers"));
    assert_eq!(server.recv().await.as_deref(), Some("PRIVMSG #chan :0 followers"));
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_session_never_answers_commands() {
    let mut h = Harness::new(MockRpc::anonymous());
    let settings = ChatSettings {
        commands: vec![CustomCommand {
            trigger: "!hi".into(),
            response: "hello".into(),
            enabled: true,
        }],
        ..settings()
    };
    let (client, _history) = spawn(&h, settings);
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();

    server.send_text(&privmsg_from("viewer", "!hi"));
    settle().await;
    assert!(server.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_socket_and_releases_bus() {
    let mut h = Harness::new(MockRpc::anonymous());
    let (client, _history) = spawn(&h, settings());
    client.connect("chan").await.unwrap();
    let mut server = h.listener.accept().await.unwrap();
    server.drain();
    assert_eq!(h.bus.subscriber_count(), 1);

    client.shutdown().await;
    assert_eq!(server.recv().await, None);
    assert_eq!(h.bus.subscriber_count(), 0);
}
