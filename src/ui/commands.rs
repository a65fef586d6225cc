// Typed commands for the ':' prompt. Numbers are 1-based on the command line.

use crate::audio::Track;
use crate::engine::Intent;
use crate::library::normalize_youtube_url;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ShellCommand {
    Engine(Intent),
    Add(String),
    /// Append library match N to the playlist
    AddFromLibrary(usize),
    /// Play library match N outside the playlist
    PlayFromLibrary(usize),
    Load(String),
    Download(Option<PathBuf>),
    Find(String),
    Rescan,
    List,
    Library,
    Status,
    Help,
    Quit,
}

/// Blank lines parse to `Ok(None)`
pub fn parse_command(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" => return Ok(None),
        "play" => ShellCommand::Engine(Intent::PlayEntry(entry_number(rest)?)),
        "pause" => ShellCommand::Engine(Intent::TogglePause),
        "stop" => ShellCommand::Engine(Intent::Stop),
        "next" => ShellCommand::Engine(Intent::Next),
        "prev" => ShellCommand::Engine(Intent::Prev),
        "shuffle" => ShellCommand::Engine(Intent::ToggleShuffle),
        "rm" => ShellCommand::Engine(Intent::Remove(entry_number(rest)?)),
        "cancel" => ShellCommand::Engine(Intent::CancelDownload),
        "add" => match rest.parse::<usize>() {
            Ok(_) => ShellCommand::AddFromLibrary(entry_number(rest)?),
            Err(_) => ShellCommand::Add(required(rest, "add needs a library number, file path or URL")?),
        },
        "lib" | "library" if rest.is_empty() => ShellCommand::Library,
        "lib" | "library" => ShellCommand::PlayFromLibrary(entry_number(rest)?),
        "find" => ShellCommand::Find(rest.to_string()),
        "rescan" => ShellCommand::Rescan,
        "load" => ShellCommand::Load(required(rest, "load needs a playlist URL")?),
        "dl" | "download" => ShellCommand::Download((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "ls" | "list" => ShellCommand::List,
        "st" | "status" => ShellCommand::Status,
        "h" | "help" | "?" => ShellCommand::Help,
        "q" | "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command '{}', try ':help'", other)),
    };

    Ok(Some(command))
}

fn entry_number(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("expected an entry number, got '{}'", arg)),
    }
}

fn required(arg: &str, message: &str) -> Result<String, String> {
    if arg.is_empty() {
        Err(message.to_string())
    } else {
        Ok(arg.to_string())
    }
}

pub fn looks_like_url(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.contains("youtube.com/")
        || target.contains("youtu.be/")
}

/// A URL becomes a remote item, anything else must be an existing file
pub fn track_for(target: &str) -> Result<Track, String> {
    if looks_like_url(target) {
        let url = normalize_youtube_url(target);
        return Ok(Track::remote(url.clone(), url, "Added"));
    }

    let path = std::fs::canonicalize(target).map_err(|e| format!("{}: {}", target, e))?;
    if !path.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }
    Ok(Track::local(path))
}
