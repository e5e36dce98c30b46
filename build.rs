use cfg_aliases::cfg_aliases;

fn main() {
    // Select the container engine once, at build time.
    // This prevents having to copy/paste the combined cfg check each time
    cfg_aliases! {
        audio_toolbox: { all(feature = "audio-toolbox", target_vendor = "apple") },
    }
}
