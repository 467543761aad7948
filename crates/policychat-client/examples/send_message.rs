use std::sync::Arc;
use std::time::Duration;

use policychat_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = ChatClient::builder()
        .transport(Arc::new(HttpBackend::from_env()?))
        .timeout(Duration::from_secs(120))
        .build()?;

    let mut state = ConversationState::new();
    let mut sessions = SessionList::new();
    client
        .send(
            "Summarize the remote work policy.",
            &mut state,
            &mut sessions,
        )
        .await?;

    for message in &state.messages {
        println!("{}: {}", message.role, message.content);
    }
    for session in &sessions.sessions {
        println!("[session {}] {}", session.id, session.title);
    }
    Ok(())
}
