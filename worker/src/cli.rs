//! Parses the two CLI one-shot flags this worker accepts alongside its
//! normal daemon mode: `--entityId <v>` and `--profile <address>`.

#[derive(Debug, Default, Clone)]
pub struct Cli {
    pub entity_id: Option<String>,
    pub profile_address: Option<String>,
}

impl Cli {
    pub fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut cli = Cli::default();
        let mut args = args.peekable();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--entityId" => cli.entity_id = args.next(),
                "--profile" => cli.profile_address = args.next(),
                _ => {}
            }
        }

        cli
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_id_flag() {
        let cli = Cli::parse(vec!["--entityId".to_owned(), "14,10".to_owned()].into_iter());
        assert_eq!(cli.entity_id.as_deref(), Some("14,10"));
        assert_eq!(cli.profile_address, None);
    }

    #[test]
    fn parses_profile_flag() {
        let cli = Cli::parse(vec!["--profile".to_owned(), "0xABC".to_owned()].into_iter());
        assert_eq!(cli.profile_address.as_deref(), Some("0xABC"));
    }

    #[test]
    fn ignores_unknown_flags() {
        let cli = Cli::parse(vec!["--unknown".to_owned(), "value".to_owned()].into_iter());
        assert_eq!(cli.entity_id, None);
        assert_eq!(cli.profile_address, None);
    }
}
