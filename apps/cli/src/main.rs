use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, AlwaysConfirm, ApiSession, DashboardClient, DeleteConfirmer, ImageUpload,
};
use shared::domain::{Post, PostId, UserId};

#[derive(Parser, Debug)]
#[command(name = "snapfeed", about = "Post images with AI captions and browse the feed")]
struct Cli {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the shared feed, newest first.
    Feed,
    /// Print one user's posts.
    UserPosts { user_id: String },
    /// Publish an image. Without --caption the caption is AI-generated.
    Post {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Toggle your like on a post.
    Like { post_id: String },
    /// Delete one of your own posts.
    Delete {
        post_id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

struct StdinConfirm;

#[async_trait]
impl DeleteConfirmer for StdinConfirm {
    async fn confirm_delete(&self, post: &Post) -> bool {
        print!("delete \"{}\"? [y/N] ", post.caption);
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.server_url.clone() {
        settings.server_url = url;
    }

    let session = Arc::new(ApiSession::from_settings(&settings)?);
    if let (Some(email), Some(password)) = (cli.email.as_deref(), cli.password.as_deref()) {
        let user = session.login(email, password).await?;
        println!("signed in as {}", user.username);
    }

    let confirmer: Arc<dyn DeleteConfirmer> = match &cli.command {
        Command::Delete { yes: true, .. } => Arc::new(AlwaysConfirm),
        _ => Arc::new(StdinConfirm),
    };
    let client = DashboardClient::new_with_http(
        session.http().clone(),
        settings.server_url.clone(),
        session.clone(),
        confirmer,
    );

    match cli.command {
        Command::Feed => {
            let posts = client.fetch_posts().await?;
            print_posts(&posts);
        }
        Command::UserPosts { user_id } => {
            let posts = client.fetch_user_posts(&UserId::new(user_id)).await?;
            print_posts(&posts);
        }
        Command::Post { image, caption } => {
            let upload = read_image(&image).await?;
            client.select_image(Some(upload)).await;
            match caption {
                Some(text) => client.set_custom_caption(text).await,
                None => {
                    if let Some(generated) = client.generate_caption().await? {
                        println!("generated caption: {generated}");
                    }
                }
            }
            client.create_post().await?;
            println!("post published");
        }
        Command::Like { post_id } => {
            if client.toggle_like(&PostId::new(&*post_id)).await? {
                let feed = client.feed().await;
                if let Some(post) = feed.iter().find(|p| p.id.as_str() == post_id) {
                    println!("{} now has {} likes", post.id, post.like_count());
                }
            } else {
                println!("another change to {post_id} is still in flight");
            }
        }
        Command::Delete { post_id, .. } => {
            // delete_post resolves ownership against the mirrored feed
            client.fetch_posts().await?;
            if client.delete_post(&PostId::new(post_id)).await? {
                println!("post deleted");
            } else {
                println!("delete cancelled");
            }
        }
    }

    Ok(())
}

async fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    Ok(ImageUpload {
        mime_type: guess_mime(path),
        filename,
        bytes,
    })
}

fn guess_mime(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    Some(mime.to_string())
}

fn print_posts(posts: &[Post]) {
    if posts.is_empty() {
        println!("no posts yet");
        return;
    }
    for post in posts {
        println!(
            "{}  {}  {} likes  {}  {}",
            post.id,
            post.author.username,
            post.like_count(),
            post.created_at.format("%Y-%m-%d %H:%M"),
            post.caption
        );
    }
}
