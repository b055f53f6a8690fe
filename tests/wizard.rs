//! Setup wizard integration tests

use std::sync::atomic::Ordering;
use std::sync::Arc;

use os1_voice::wizard::{COMPLETE_STAGE, GREETING, Slot};
use os1_voice::{Error, Gender, SetupWizard, VoiceKind, WizardProgress};
use tokio_test::{assert_err, assert_ok};

mod common;

use common::{AudioStats, FakeSynth, fake_playback, test_catalog};

#[tokio::test(start_paused = true)]
async fn test_start_speaks_welcome_then_first_question() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());

    let progress = assert_ok!(wizard.start(&audio, &playback).await);

    assert_eq!(progress, WizardProgress::Awaiting { stage: 1 });
    assert!(audio.is_unlocked());
    let texts = synth.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with("Welcome to the world's first"));
    assert_eq!(texts[1], "Are you social or anti-social?");
    assert!(
        synth
            .requests
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.kind == VoiceKind::Setup && r.voice_id == "setup-voice")
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_is_single_shot() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());

    wizard.start(&audio, &playback).await.unwrap();
    let again = wizard.start(&audio, &playback).await.unwrap();

    assert_eq!(again, WizardProgress::Awaiting { stage: 1 });
    assert_eq!(synth.texts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_dialogue_assigns_male_persona() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());
    wizard.start(&audio, &playback).await.unwrap();

    let progress = wizard
        .answer("I'm pretty social", 1, &playback)
        .await
        .unwrap();
    assert_eq!(progress, WizardProgress::Awaiting { stage: 2 });
    assert_eq!(
        synth.last().unwrap().text,
        "How's your relationship with your mother?"
    );

    let progress = wizard.answer("It's fine", 2, &playback).await.unwrap();
    assert_eq!(progress, WizardProgress::Awaiting { stage: 3 });
    let texts = synth.texts();
    assert_eq!(
        &texts[texts.len() - 2..],
        &[
            "Thank you. Please wait as your individualized operating system is initiated.",
            "Would you like a male or female voice?",
        ]
    );

    let progress = wizard.answer("  Male, please ", 3, &playback).await.unwrap();
    let WizardProgress::Complete(profile) = progress else {
        panic!("expected completion, got {progress:?}");
    };
    assert_eq!(profile.name, "Theo");
    assert_eq!(profile.gender, Gender::Male);
    assert!(wizard.is_complete());
    assert_eq!(wizard.stage(), COMPLETE_STAGE);

    let greeting = synth.last().unwrap();
    assert_eq!(greeting.text, GREETING);
    assert_eq!(greeting.kind, VoiceKind::Persona(Gender::Male));
    assert_eq!(greeting.voice_id, "m-voice");

    let slots: Vec<Slot> = wizard.answers().iter().map(|a| a.slot).collect();
    assert_eq!(
        slots,
        vec![Slot::Sociability, Slot::Mother, Slot::VoicePreference]
    );
    assert_eq!(wizard.answers()[2].text, "Male, please");
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_voice_answer_picks_female() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());
    wizard.start(&audio, &playback).await.unwrap();
    wizard.answer("social", 1, &playback).await.unwrap();
    wizard.answer("good", 2, &playback).await.unwrap();

    let progress = wizard
        .answer("male or female, I don't mind", 3, &playback)
        .await
        .unwrap();

    assert!(matches!(
        progress,
        WizardProgress::Complete(ref p) if p.name == "Sam" && p.gender == Gender::Female
    ));
}

#[tokio::test(start_paused = true)]
async fn test_answer_for_wrong_stage_is_rejected() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());

    let err = wizard.answer("hello", 1, &playback).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    wizard.start(&audio, &playback).await.unwrap();
    let err = wizard.answer("hello", 2, &playback).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(wizard.stage(), 1);
    assert!(wizard.answers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_prompt_keeps_stage() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());
    wizard.start(&audio, &playback).await.unwrap();

    synth.fail.store(true, Ordering::SeqCst);
    assert_err!(wizard.answer("social", 1, &playback).await);
    assert_eq!(wizard.stage(), 1);
    assert!(wizard.answers().is_empty());

    synth.fail.store(false, Ordering::SeqCst);
    let progress = assert_ok!(wizard.answer("social", 1, &playback).await);
    assert_eq!(progress, WizardProgress::Awaiting { stage: 2 });
    assert_eq!(wizard.answers().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_locked_audio_leaves_wizard_restartable() {
    let stats = Arc::new(AudioStats::default());
    stats.create_failures.store(1, Ordering::SeqCst);
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());

    let err = wizard.start(&audio, &playback).await.unwrap_err();
    assert!(matches!(err, Error::AudioLocked(_)));
    assert_eq!(wizard.stage(), 0);
    assert!(synth.texts().is_empty());

    let progress = wizard.start(&audio, &playback).await.unwrap();
    assert_eq!(progress, WizardProgress::Awaiting { stage: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_reset_allows_a_new_run() {
    let stats = Arc::new(AudioStats::default());
    let synth = Arc::new(FakeSynth::default());
    let (audio, playback) = fake_playback(&stats, &synth);
    let mut wizard = SetupWizard::new(test_catalog());
    wizard.start(&audio, &playback).await.unwrap();
    wizard.answer("social", 1, &playback).await.unwrap();

    wizard.reset();
    assert_eq!(wizard.stage(), 0);
    assert!(wizard.answers().is_empty());
    assert!(wizard.profile().is_none());

    let progress = wizard.start(&audio, &playback).await.unwrap();
    assert_eq!(progress, WizardProgress::Awaiting { stage: 1 });
}
