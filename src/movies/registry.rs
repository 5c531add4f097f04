//! Builds the list of movies to rotate through from the user's slots.

use std::{ffi::CString, path::Path};

use rand::{seq::SliceRandom, Rng};

use crate::settings::OpeningMovie;

/// The folder inside the mod's directory that holds the replacement movies.
pub const MOVIES_FOLDER: &str = "Movies";

/// What gets passed to the game when a movie is picked.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MoviePath {
    /// The game's own path is passed through untouched.
    Original,

    /// A NUL-terminated path to one of our movie files.
    Replacement(CString),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MovieEntry {
    pub movie: OpeningMovie,
    pub path: MoviePath,
}

impl MovieEntry {
    /// Returns an entry that keeps the game's opening.
    pub fn builtin() -> MovieEntry {
        MovieEntry {
            movie: OpeningMovie::FullMoonFullLife,
            path: MoviePath::Original,
        }
    }
}

/// Encodes `path` the way the game expects a narrow path.
#[cfg(unix)]
fn narrow_bytes(path: &Path) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;

    Some(path.as_os_str().as_bytes().to_vec())
}

/// Encodes `path` in the ANSI code page. Returns `None` if any character has no exact equivalent.
#[cfg(windows)]
fn narrow_bytes(path: &Path) -> Option<Vec<u8>> {
    use std::{os::windows::ffi::OsStrExt, ptr};
    use winapi::um::{
        stringapiset::WideCharToMultiByte,
        winnls::{GetACP, CP_ACP, CP_UTF8, WC_NO_BEST_FIT_CHARS},
    };

    // `WideCharToMultiByte` rejects the flags and the default-char check for UTF-8.
    if unsafe { GetACP() } == CP_UTF8 {
        return path.to_str().map(|path| path.as_bytes().to_vec());
    }

    let wide: Vec<u16> = path.as_os_str().encode_wide().collect();

    if wide.is_empty() {
        return Some(Vec::new());
    }

    let wide_len = i32::try_from(wide.len()).ok()?;
    let mut used_default = 0;

    unsafe {
        let size = WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            wide.as_ptr(),
            wide_len,
            ptr::null_mut(),
            0,
            ptr::null(),
            &mut used_default,
        );

        if size <= 0 || used_default != 0 {
            return None;
        }

        let mut buffer = vec![0u8; size as usize];

        let written = WideCharToMultiByte(
            CP_ACP,
            WC_NO_BEST_FIT_CHARS,
            wide.as_ptr(),
            wide_len,
            buffer.as_mut_ptr().cast(),
            size,
            ptr::null(),
            &mut used_default,
        );

        if written <= 0 || used_default != 0 {
            return None;
        }

        buffer.truncate(written as usize);
        Some(buffer)
    }
}

#[cfg(not(any(unix, windows)))]
fn narrow_bytes(path: &Path) -> Option<Vec<u8>> {
    path.to_str().map(|path| path.as_bytes().to_vec())
}

/// Resolves the path of `movie` inside `movies_dir`, returning `None` (with a warning) if it
/// can't be used.
fn resolve(
    movie: OpeningMovie,
    movies_dir: &Path,
    path_exists: &impl Fn(&Path) -> bool,
) -> Option<CString> {
    let movie_path = movies_dir.join(movie.file_name());

    if !path_exists(&movie_path) {
        log::warn!(
            "{} not found. {} will not be played.",
            movie_path.display(),
            movie
        );

        return None;
    }

    // The game reads the path as a narrow C string.
    let bytes = match narrow_bytes(&movie_path) {
        Some(bytes) => bytes,
        None => {
            log::warn!(
                "{} can't be represented in the system code page. {} will not be played.",
                movie_path.display(),
                movie
            );

            return None;
        }
    };

    match CString::new(bytes) {
        Ok(c_path) => Some(c_path),
        Err(err) => {
            log::warn!(
                "{} can't be passed to the game ({err}). {} will not be played.",
                movie_path.display(),
                movie
            );

            None
        }
    }
}

/// Shuffles `entries` in place.
pub fn shuffle(entries: &mut [MovieEntry], rng: &mut impl Rng) {
    log::debug!("Shuffling movies.");

    // Fisher-Yates, swapping from the back.
    entries.shuffle(rng);
}

/// Turns the configured slots into a list of playable movies. The list is never empty: if none of
/// the slots can be used, the game's own opening is used instead.
pub fn build(
    slots: &[OpeningMovie],
    shuffle_order: bool,
    path_exists: impl Fn(&Path) -> bool,
    movies_dir: &Path,
    rng: &mut impl Rng,
) -> Vec<MovieEntry> {
    let mut entries = Vec::with_capacity(slots.len());

    for &movie in slots {
        match movie {
            OpeningMovie::None => continue,

            OpeningMovie::FullMoonFullLife => entries.push(MovieEntry::builtin()),

            _ => {
                if let Some(path) = resolve(movie, movies_dir, &path_exists) {
                    entries.push(MovieEntry {
                        movie,
                        path: MoviePath::Replacement(path),
                    });
                }
            }
        }
    }

    if entries.is_empty() {
        log::warn!("No valid movies set, falling back to Full Moon Full Life.");
        entries.push(MovieEntry::builtin());
    }

    if shuffle_order && entries.len() > 1 {
        shuffle(&mut entries, rng);
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use strum::IntoEnumIterator;

    fn movies_dir() -> &'static Path {
        Path::new("mods/p3rpc.alternatingopenings/Movies")
    }

    fn expected_path(movie: OpeningMovie) -> MoviePath {
        let path = movies_dir().join(movie.file_name());
        MoviePath::Replacement(CString::new(narrow_bytes(&path).unwrap()).unwrap())
    }

    #[test]
    fn keeps_slot_order_without_shuffle() {
        let slots = [
            OpeningMovie::FullMoonFullLife,
            OpeningMovie::BurnMyDread,
            OpeningMovie::P3Fes,
            OpeningMovie::None,
        ];

        let entries = build(&slots, false, |_| true, movies_dir(), &mut StdRng::seed_from_u64(0));

        assert_eq!(
            entries,
            vec![
                MovieEntry::builtin(),
                MovieEntry {
                    movie: OpeningMovie::BurnMyDread,
                    path: expected_path(OpeningMovie::BurnMyDread),
                },
                MovieEntry {
                    movie: OpeningMovie::P3Fes,
                    path: expected_path(OpeningMovie::P3Fes),
                },
            ]
        );
    }

    #[test]
    fn missing_files_are_skipped() {
        let slots = [
            OpeningMovie::BurnMyDread,
            OpeningMovie::SoulPhrase,
            OpeningMovie::None,
            OpeningMovie::P3Fes,
        ];

        let entries = build(
            &slots,
            false,
            |path| !path.ends_with("SoulPhrase.usm"),
            movies_dir(),
            &mut StdRng::seed_from_u64(0),
        );

        let movies: Vec<_> = entries.iter().map(|entry| entry.movie).collect();
        assert_eq!(movies, vec![OpeningMovie::BurnMyDread, OpeningMovie::P3Fes]);
    }

    #[test]
    fn falls_back_to_builtin_when_nothing_is_usable() {
        let all_missing = [
            OpeningMovie::BurnMyDread,
            OpeningMovie::P3Fes,
            OpeningMovie::SoulPhrase,
            OpeningMovie::EpisodeAigis,
        ];

        for shuffle_order in [false, true] {
            let entries = build(
                &all_missing,
                shuffle_order,
                |_| false,
                movies_dir(),
                &mut StdRng::seed_from_u64(3),
            );

            assert_eq!(entries, vec![MovieEntry::builtin()]);
        }

        let empty = [OpeningMovie::None; 4];
        let entries = build(&empty, false, |_| true, movies_dir(), &mut StdRng::seed_from_u64(0));
        assert_eq!(entries, vec![MovieEntry::builtin()]);
    }

    #[test]
    fn builtin_never_checks_for_a_file() {
        let slots = [OpeningMovie::FullMoonFullLife; 4];

        let entries = build(
            &slots,
            false,
            |path| panic!("unexpected lookup of {}", path.display()),
            movies_dir(),
            &mut StdRng::seed_from_u64(0),
        );

        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|entry| entry.path == MoviePath::Original));
    }

    #[cfg(unix)]
    #[test]
    fn game_gets_the_bytes_that_were_checked() {
        use std::{cell::RefCell, ffi::OsStr, os::unix::ffi::OsStrExt, path::PathBuf};

        let movies_dir = Path::new(OsStr::from_bytes(b"/mods/\xffopen/Movies"));
        let checked = RefCell::new(Vec::<PathBuf>::new());

        let entries = build(
            &[OpeningMovie::P3Fes],
            false,
            |path| {
                checked.borrow_mut().push(path.to_path_buf());
                true
            },
            movies_dir,
            &mut StdRng::seed_from_u64(0),
        );

        let checked = checked.into_inner();
        assert_eq!(checked.len(), 1);

        match &entries[0].path {
            MoviePath::Replacement(path) => {
                assert_eq!(path.as_bytes(), b"/mods/\xffopen/Movies/P3Fes.usm");
                assert_eq!(path.as_bytes(), checked[0].as_os_str().as_bytes());
            }

            MoviePath::Original => panic!("P3Fes should have been replaced"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unrepresentable_paths_are_skipped() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let movies_dir = Path::new(OsStr::from_bytes(b"/mods/bad\0dir/Movies"));

        let entries = build(
            &[OpeningMovie::BurnMyDread, OpeningMovie::SoulPhrase],
            false,
            |_| true,
            movies_dir,
            &mut StdRng::seed_from_u64(0),
        );

        assert_eq!(entries, vec![MovieEntry::builtin()]);
    }

    #[cfg(windows)]
    #[test]
    fn ascii_paths_survive_the_code_page() {
        let path = Path::new(r"C:\Reloaded\Mods\p3rpc.alternatingopenings\Movies\P3Fes.usm");

        assert_eq!(
            narrow_bytes(path).unwrap(),
            path.to_str().unwrap().as_bytes()
        );
    }

    #[test]
    fn every_combination_has_at_least_one_entry() {
        let movies: Vec<_> = OpeningMovie::iter().collect();

        for (i, &a) in movies.iter().enumerate() {
            for &b in &movies[i..] {
                let slots = [a, b, OpeningMovie::None, a];

                for exists in [false, true] {
                    let entries = build(
                        &slots,
                        true,
                        |_| exists,
                        movies_dir(),
                        &mut StdRng::seed_from_u64(i as u64),
                    );

                    assert!(!entries.is_empty());
                }
            }
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let slots = [
            OpeningMovie::FullMoonFullLife,
            OpeningMovie::BurnMyDread,
            OpeningMovie::P3Fes,
            OpeningMovie::SoulPhrase,
        ];

        let ordered = build(&slots, false, |_| true, movies_dir(), &mut StdRng::seed_from_u64(0));
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let mut shuffled = ordered.clone();
            shuffle(&mut shuffled, &mut rng);

            let mut sorted: Vec<_> = shuffled.iter().map(|e| e.movie.to_string()).collect();
            let mut expected: Vec<_> = ordered.iter().map(|e| e.movie.to_string()).collect();
            sorted.sort();
            expected.sort();

            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn shuffle_of_one_is_a_no_op() {
        let mut entries = vec![MovieEntry::builtin()];
        shuffle(&mut entries, &mut StdRng::seed_from_u64(9));
        assert_eq!(entries, vec![MovieEntry::builtin()]);

        let mut empty: Vec<MovieEntry> = vec![];
        shuffle(&mut empty, &mut StdRng::seed_from_u64(9));
        assert!(empty.is_empty());
    }

    #[test]
    fn shuffle_reaches_more_than_one_order() {
        let slots = [
            OpeningMovie::FullMoonFullLife,
            OpeningMovie::BurnMyDread,
            OpeningMovie::P3Fes,
            OpeningMovie::SoulPhrase,
        ];

        let mut rng = StdRng::seed_from_u64(7);
        let orders: std::collections::HashSet<Vec<OpeningMovie>> = (0..50)
            .map(|_| {
                build(&slots, true, |_| true, movies_dir(), &mut rng)
                    .into_iter()
                    .map(|entry| entry.movie)
                    .collect()
            })
            .collect();

        assert!(orders.len() > 1);
    }
}
