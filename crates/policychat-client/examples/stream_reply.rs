use std::sync::Arc;

use policychat_client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let client = ChatClient::new(Arc::new(HttpBackend::from_env()?));

    let mut stream = client
        .stream_reply(client.request("What does the visitor policy say?", None))
        .await?;

    while let Some(chunk) = stream.next_chunk().await {
        match chunk {
            StreamChunk::ChatInfo { chat_id, title } => {
                eprintln!("chat {chat_id}: {}", title.as_deref().unwrap_or("New Chat"));
            }
            StreamChunk::TextDelta { delta } => print!("{delta}"),
            StreamChunk::Status { .. } => println!(),
            StreamChunk::Error { message } => eprintln!("assistant error: {message}"),
        }
    }

    stream.finish().await?;
    Ok(())
}
